//! Conversation fan-out: message append, typing presence and read receipts
//! for one-to-one conversations.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde_json::json;
use tracing::{debug, error, info, warn};

use travelsbud_db::{Database, Direction, Document, Query, Transaction, fields, server_timestamp, watch};
use travelsbud_types::models::{ChatMessage, Conversation, ReadReceipt};

use crate::error::CoreError;
use crate::push::PushGateway;
use crate::receipts::{self, ReceiptEffect, ReceiptState};
use crate::{blocking, paths};

/// Title of every new-message notification.
pub const PUSH_TITLE: &str = "New Message!";

#[derive(Clone)]
pub struct Fanout {
    db: Arc<Database>,
    push: Arc<dyn PushGateway>,
}

impl Fanout {
    pub fn new(db: Arc<Database>, push: Arc<dyn PushGateway>) -> Self {
        Self { db, push }
    }

    pub async fn conversation(&self, conversation_id: &str) -> Result<Conversation, CoreError> {
        paths::check_id("conversation", conversation_id)?;
        let path = paths::chat(conversation_id);
        blocking(&self.db, move |db| {
            let doc = db
                .get(&path)
                .map_err(CoreError::read("read conversation"))?
                .ok_or(CoreError::NotFound(path))?;
            doc.decode().map_err(CoreError::read("decode conversation"))
        })
        .await
    }

    /// The conversation, provided `user_id` takes part in it.
    pub async fn conversation_for(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, CoreError> {
        let conversation = self.conversation(conversation_id).await?;
        if !conversation.has_participant(user_id) {
            return Err(CoreError::Forbidden(format!(
                "{} is not in conversation {}",
                user_id, conversation_id
            )));
        }
        Ok(conversation)
    }

    /// Append a message, refresh the conversation's last message, clear the
    /// sender's typing flag, then notify the other participants. Returns the
    /// new message id.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<String, CoreError> {
        paths::check_id("conversation", conversation_id)?;
        paths::check_id("user", sender_id)?;
        if text.trim().is_empty() {
            return Err(CoreError::InvalidInput("message text is empty".into()));
        }

        let conversation_id_owned = conversation_id.to_string();
        let sender = sender_id.to_string();
        let body = text.to_string();
        let result = blocking(&self.db, move |db| {
            db.run_transaction(|tx| append_message(tx, &conversation_id_owned, &sender, &body))
        })
        .await;

        let (message_id, device_tokens) = match result {
            Ok(sent) => sent,
            Err(e) => {
                error!(
                    "send_message in {} by {} failed: {}",
                    conversation_id, sender_id, e
                );
                return Err(e);
            }
        };

        info!(
            "Message {} sent in conversation {} by {}",
            message_id, conversation_id, sender_id
        );
        self.notify_detached(device_tokens, text);
        Ok(message_id)
    }

    fn notify_detached(&self, device_tokens: Vec<String>, text: &str) {
        for token in device_tokens {
            let push = self.push.clone();
            let body = text.to_string();
            tokio::spawn(async move {
                if let Err(e) = push.notify(&token, PUSH_TITLE, &body).await {
                    warn!("Push notification failed: {}", e);
                }
            });
        }
    }

    /// Last-writer-wins upsert of the user's typing flag.
    pub async fn set_typing(
        &self,
        conversation_id: &str,
        user_id: &str,
        typing: bool,
    ) -> Result<(), CoreError> {
        paths::check_id("conversation", conversation_id)?;
        paths::check_id("user", user_id)?;

        let path = paths::typing_state(conversation_id, user_id);
        blocking(&self.db, move |db| {
            db.set(&path, fields(json!({ "typing": typing })))
                .map_err(CoreError::write("write typing state"))
        })
        .await
        .inspect_err(|e| {
            error!(
                "set_typing {} in {} failed: {}",
                user_id, conversation_id, e
            )
        })?;

        debug!("{} typing={} in {}", user_id, typing, conversation_id);
        Ok(())
    }

    /// One-shot read of the ordered message list.
    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, CoreError> {
        paths::check_id("conversation", conversation_id)?;
        let query = messages_query(conversation_id);
        let docs = blocking(&self.db, move |db| {
            db.query(&query).map_err(CoreError::read("read messages"))
        })
        .await?;
        Ok(decode_messages(&docs))
    }

    /// Live ordered message list. Every item is the full current set,
    /// ascending by server timestamp.
    pub fn subscribe_messages(
        &self,
        conversation_id: &str,
    ) -> impl Stream<Item = Result<Vec<ChatMessage>, CoreError>> + Send + use<> {
        watch(self.db.clone(), messages_query(conversation_id)).map(|snapshot| {
            snapshot
                .map(|docs| decode_messages(&docs))
                .map_err(CoreError::read("watch messages"))
        })
    }

    /// [`Fanout::subscribe_messages`] as observed by `reader_id`: every
    /// snapshot is folded through the read-receipt reducer and the resulting
    /// receipt writes are applied before the snapshot is yielded. A failed
    /// receipt write is logged and does not end the stream.
    pub fn subscribe_messages_as_reader(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> impl Stream<Item = Result<Vec<ChatMessage>, CoreError>> + Send + use<> {
        let db = self.db.clone();
        let conversation_id = conversation_id.to_string();
        let reader_id = reader_id.to_string();
        let snapshots = self.subscribe_messages(&conversation_id);

        async_stream::stream! {
            let mut state = ReceiptState::default();
            futures_util::pin_mut!(snapshots);

            while let Some(snapshot) = snapshots.next().await {
                let messages = match snapshot {
                    Ok(messages) => messages,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };

                let (next, effects) = receipts::reduce(&state, &messages);
                state = next;
                for effect in effects {
                    if let Err(e) = apply_receipt(&db, &conversation_id, &reader_id, effect).await {
                        warn!(
                            "Read receipt for {} in {} not written: {}",
                            reader_id, conversation_id, e
                        );
                    }
                }

                yield Ok(messages);
            }
        }
    }

    /// Live "is someone else typing" flag for `self_id`.
    pub fn subscribe_typing(
        &self,
        conversation_id: &str,
        self_id: &str,
    ) -> impl Stream<Item = Result<bool, CoreError>> + Send + use<> {
        let self_id = self_id.to_string();
        watch(self.db.clone(), Query::new(paths::typing(conversation_id))).map(move |snapshot| {
            snapshot
                .map(|docs| someone_else_typing(&docs, &self_id))
                .map_err(CoreError::read("watch typing"))
        })
    }

    /// The id of the last message `user_id` has read, if any.
    pub async fn fetch_last_read_id(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, CoreError> {
        paths::check_id("conversation", conversation_id)?;
        paths::check_id("user", user_id)?;
        let path = paths::read_receipt(conversation_id, user_id);
        blocking(&self.db, move |db| {
            let Some(doc) = db.get(&path).map_err(CoreError::read("read receipt"))? else {
                return Ok(None);
            };
            let receipt: ReadReceipt = doc.decode().map_err(CoreError::read("decode receipt"))?;
            Ok(Some(receipt.last_read_id))
        })
        .await
    }
}

fn messages_query(conversation_id: &str) -> Query {
    Query::new(paths::chat_messages(conversation_id)).order_by("timestamp", Direction::Ascending)
}

fn append_message(
    tx: &mut Transaction<'_>,
    conversation_id: &str,
    sender_id: &str,
    text: &str,
) -> Result<(String, Vec<String>), CoreError> {
    let chat_path = paths::chat(conversation_id);
    let conversation: Conversation = tx
        .get(&chat_path)
        .map_err(CoreError::read("read conversation"))?
        .ok_or_else(|| CoreError::NotFound(chat_path.clone()))?
        .decode()
        .map_err(CoreError::read("decode conversation"))?;

    if !conversation.has_participant(sender_id) {
        return Err(CoreError::Forbidden(format!(
            "{} is not in conversation {}",
            sender_id, conversation_id
        )));
    }

    let message_id = tx
        .add_document(
            &paths::chat_messages(conversation_id),
            fields(json!({
                "senderID": sender_id,
                "text": text,
                "timestamp": server_timestamp(),
            })),
        )
        .map_err(CoreError::write("append message"))?;

    tx.update(
        &chat_path,
        fields(json!({
            "lastMessage": text,
            "timestamp": server_timestamp(),
        })),
    )
    .map_err(CoreError::write("update last message"))?;

    // Sending implies no longer typing.
    tx.set(
        &paths::typing_state(conversation_id, sender_id),
        fields(json!({ "typing": false })),
    )
    .map_err(CoreError::write("clear typing state"))?;

    let mut device_tokens = Vec::new();
    for other in conversation.others(sender_id) {
        let token = tx
            .get(&paths::user(other))
            .map_err(CoreError::read("read recipient profile"))?
            .and_then(|doc| doc.get_str("fcmToken").map(str::to_string))
            .filter(|token| !token.is_empty());
        match token {
            Some(token) => device_tokens.push(token),
            None => debug!("No device token for {}, skipping push", other),
        }
    }

    Ok((message_id, device_tokens))
}

async fn apply_receipt(
    db: &Arc<Database>,
    conversation_id: &str,
    reader_id: &str,
    effect: ReceiptEffect,
) -> Result<(), CoreError> {
    let ReceiptEffect::WriteReceipt { last_read_id } = effect;
    let path = paths::read_receipt(conversation_id, reader_id);
    debug!("{} read up to {} in {}", reader_id, last_read_id, conversation_id);
    blocking(db, move |db| {
        db.set(
            &path,
            fields(json!({
                "lastReadID": last_read_id,
                "timestamp": server_timestamp(),
            })),
        )
        .map_err(CoreError::write("write read receipt"))
    })
    .await
}

/// Decode message documents, skipping (and logging) any that are malformed.
pub(crate) fn decode_messages(docs: &[Document]) -> Vec<ChatMessage> {
    docs.iter()
        .filter_map(|doc| match doc.decode::<ChatMessage>() {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!("Skipping malformed message: {}", e);
                None
            }
        })
        .collect()
}

/// True iff any typing document other than `self_id`'s says `typing: true`.
pub fn someone_else_typing(docs: &[Document], self_id: &str) -> bool {
    docs.iter()
        .any(|doc| doc.id != self_id && doc.get_bool("typing").unwrap_or(false))
}
