use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use travelsbud_core::{CoreError, Services};
use travelsbud_types::api::Claims;
use travelsbud_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket may stay silent before it must have identified.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// What a connection is watching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum WatchKey {
    Conversation(String),
    GroupChat(String),
    Meetups,
}

/// Background tasks feeding one watch to this connection.
/// Dropping the watch stops them, which releases their store subscriptions.
struct Watch {
    tasks: Vec<JoinHandle<()>>,
}

impl Watch {
    /// Every task has ended, e.g. after its stream failed.
    fn is_finished(&self) -> bool {
        self.tasks.iter().all(|task| task.is_finished())
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

type Watches = HashMap<WatchKey, Watch>;

/// Handle a single WebSocket connection: Identify handshake, then the
/// command/event loop until either side goes away.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    services: Services,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let user_id = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} connected to gateway", user_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        user_id: user_id.clone(),
    };
    let Some(ready) = encode(&ready) else {
        return;
    };
    if sender.send(ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, services, user_id).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    services: Services,
    user_id: String,
) {
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(&user_id).await;

    // Snapshots produced by this connection's watch tasks.
    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Spawn task to forward targeted events + watch output -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            let event = tokio::select! {
                result = user_rx.recv() => match result {
                    Some(event) => event,
                    None => break,
                },
                result = watch_rx.recv() => match result {
                    Some(event) => event,
                    None => break,
                },
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let Some(msg) = encode(&event) else {
                continue;
            };
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Read commands from client
    let recv_user_id = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        // Owned by this task: aborting the task tears every watch down.
        let mut watches = Watches::new();

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&services, &recv_user_id, cmd, &mut watches, &watch_tx).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            recv_user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_user_channel(&user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<String> {
    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return verify_token(&token, jwt_secret);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

/// Validate a session token and return its user id.
pub fn verify_token(token: &str, jwt_secret: &str) -> Option<String> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    Some(token_data.claims.sub).filter(|sub| !sub.is_empty())
}

async fn handle_command(
    services: &Services,
    user_id: &str,
    cmd: GatewayCommand,
    watches: &mut Watches,
    events: &mpsc::UnboundedSender<GatewayEvent>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::WatchConversation { conversation_id } => {
            let key = WatchKey::Conversation(conversation_id.clone());
            if is_watching(watches, &key) {
                debug!("{} already watching {}", user_id, conversation_id);
                return;
            }

            // Only participants get to see the conversation.
            if let Err(e) = services
                .fanout
                .conversation_for(&conversation_id, user_id)
                .await
            {
                warn!("{} cannot watch {}: {}", user_id, conversation_id, e);
                let _ = events.send(GatewayEvent::WatchFailed {
                    conversation_id,
                    reason: watch_failure_reason(&e),
                });
                return;
            }

            info!("{} watching conversation {}", user_id, conversation_id);
            watches.insert(key, watch_conversation(services, user_id, &conversation_id, events));
        }

        GatewayCommand::Unwatch { conversation_id } => {
            if watches
                .remove(&WatchKey::Conversation(conversation_id.clone()))
                .is_some()
            {
                info!("{} stopped watching {}", user_id, conversation_id);
            }
        }

        GatewayCommand::SetTyping {
            conversation_id,
            typing,
        } => {
            // Participation was checked when the watch started.
            if !watches.contains_key(&WatchKey::Conversation(conversation_id.clone())) {
                warn!(
                    "{} sent SetTyping for unwatched conversation {}",
                    user_id, conversation_id
                );
                return;
            }
            if let Err(e) = services
                .fanout
                .set_typing(&conversation_id, user_id, typing)
                .await
            {
                warn!("SetTyping from {} in {} failed: {}", user_id, conversation_id, e);
            }
        }

        GatewayCommand::WatchMeetups => {
            if is_watching(watches, &WatchKey::Meetups) {
                return;
            }
            debug!("{} watching meetups", user_id);
            let task = forward(
                services.meetups.watch_meetups(),
                events,
                format!("Meetup watch for {}", user_id),
                |snapshot| snapshot.ok().map(|meetups| GatewayEvent::Meetups { meetups }),
            );
            watches.insert(WatchKey::Meetups, Watch { tasks: vec![task] });
        }

        GatewayCommand::UnwatchMeetups => {
            watches.remove(&WatchKey::Meetups);
        }

        GatewayCommand::WatchGroupChat { group_id } => {
            let key = WatchKey::GroupChat(group_id.clone());
            if is_watching(watches, &key) {
                return;
            }
            if let Err(e) = services.group_chats.group_chat_for(&group_id, user_id).await {
                warn!("{} cannot watch group chat {}: {}", user_id, group_id, e);
                let _ = events.send(GatewayEvent::GroupChatWatchFailed {
                    group_id,
                    reason: watch_failure_reason(&e),
                });
                return;
            }

            info!("{} watching group chat {}", user_id, group_id);
            let task = {
                let group_id = group_id.clone();
                forward(
                    services.group_chats.subscribe_group_messages(&group_id),
                    events,
                    format!("Group chat watch on {}", group_id),
                    move |snapshot| {
                        Some(match snapshot {
                            Ok(messages) => GatewayEvent::GroupMessages {
                                group_id: group_id.clone(),
                                messages,
                            },
                            Err(e) => GatewayEvent::GroupChatWatchFailed {
                                group_id: group_id.clone(),
                                reason: watch_failure_reason(&e),
                            },
                        })
                    },
                )
            };
            watches.insert(key, Watch { tasks: vec![task] });
        }

        GatewayCommand::UnwatchGroupChat { group_id } => {
            watches.remove(&WatchKey::GroupChat(group_id));
        }
    }
}

/// A live watch under `key` exists. A watch whose tasks all ended is
/// dropped so the client can start it again.
fn is_watching(watches: &mut Watches, key: &WatchKey) -> bool {
    match watches.get(key) {
        Some(watch) if watch.is_finished() => {
            watches.remove(key);
            false
        }
        Some(_) => true,
        None => false,
    }
}

fn watch_conversation(
    services: &Services,
    user_id: &str,
    conversation_id: &str,
    events: &mpsc::UnboundedSender<GatewayEvent>,
) -> Watch {
    let messages = {
        let conversation_id = conversation_id.to_string();
        forward(
            services
                .fanout
                .subscribe_messages_as_reader(&conversation_id, user_id),
            events,
            format!("Message watch on {}", conversation_id),
            move |snapshot| {
                Some(match snapshot {
                    Ok(messages) => GatewayEvent::Messages {
                        conversation_id: conversation_id.clone(),
                        messages,
                    },
                    Err(e) => GatewayEvent::WatchFailed {
                        conversation_id: conversation_id.clone(),
                        reason: watch_failure_reason(&e),
                    },
                })
            },
        )
    };

    let typing = {
        let conversation_id = conversation_id.to_string();
        forward(
            services.fanout.subscribe_typing(&conversation_id, user_id),
            events,
            format!("Typing watch on {}", conversation_id),
            move |snapshot| {
                snapshot.ok().map(|typing| GatewayEvent::Typing {
                    conversation_id: conversation_id.clone(),
                    typing,
                })
            },
        )
    };

    Watch {
        tasks: vec![messages, typing],
    }
}

/// Pump a live stream into the connection's event channel. The task ends
/// after the first error or once the connection stops listening.
fn forward<S, T, F>(
    stream: S,
    events: &mpsc::UnboundedSender<GatewayEvent>,
    label: String,
    to_event: F,
) -> JoinHandle<()>
where
    S: Stream<Item = Result<T, CoreError>> + Send + 'static,
    T: Send + 'static,
    F: Fn(Result<T, CoreError>) -> Option<GatewayEvent> + Send + 'static,
{
    let events = events.clone();
    tokio::spawn(async move {
        futures_util::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            let failed = match &item {
                Ok(_) => false,
                Err(e) => {
                    warn!("{} ended: {}", label, e);
                    true
                }
            };
            if let Some(event) = to_event(item) {
                if events.send(event).is_err() {
                    return;
                }
            }
            if failed {
                return;
            }
        }
        debug!("{} ended", label);
    })
}

/// Client-facing reason; store internals stay in the log.
fn watch_failure_reason(e: &CoreError) -> String {
    match e {
        CoreError::NotFound(_) => "not_found".into(),
        CoreError::Forbidden(_) => "forbidden".into(),
        CoreError::InvalidInput(_) => "invalid".into(),
        _ => "unavailable".into(),
    }
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            None
        }
    }
}
