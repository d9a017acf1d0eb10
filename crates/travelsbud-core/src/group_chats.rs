use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde_json::json;
use tracing::{info, warn};

use travelsbud_db::{Database, Direction, Query, fields, server_timestamp, watch};
use travelsbud_types::api::CreateGroupChatRequest;
use travelsbud_types::models::{ChatMessage, GroupChat};

use crate::error::CoreError;
use crate::fanout::decode_messages;
use crate::identity::{IdentityProvider, require_user};
use crate::{blocking, paths};

const MAX_PARTICIPANTS: usize = 50;

#[derive(Clone)]
pub struct GroupChats {
    db: Arc<Database>,
}

impl GroupChats {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a group chat. The creator is always a participant; duplicate
    /// ids are dropped, first occurrence wins.
    pub async fn create_group_chat<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
        req: CreateGroupChatRequest,
    ) -> Result<String, CoreError> {
        let user_id = require_user(identity)?.to_string();
        let title = req.title.trim().to_string();
        if title.is_empty() {
            return Err(CoreError::InvalidInput("group chat title is empty".into()));
        }

        let mut participants = vec![user_id.clone()];
        for participant in req.participants {
            paths::check_id("user", &participant)?;
            if !participants.contains(&participant) {
                participants.push(participant);
            }
        }
        if participants.len() > MAX_PARTICIPANTS {
            return Err(CoreError::InvalidInput(format!(
                "group chats are limited to {} participants",
                MAX_PARTICIPANTS
            )));
        }

        let count = participants.len();
        let body = fields(json!({
            "title": title,
            "creatorID": user_id,
            "participants": participants,
            "timestamp": server_timestamp(),
        }));
        let group_id = blocking(&self.db, move |db| {
            db.add_document(paths::GROUP_CHATS, body)
                .map_err(CoreError::write("create group chat"))
        })
        .await?;

        info!(
            "Group chat {} created by {} with {} participants",
            group_id, user_id, count
        );
        Ok(group_id)
    }

    /// Group chats the caller takes part in.
    pub async fn list_group_chats<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
    ) -> Result<Vec<GroupChat>, CoreError> {
        let user_id = require_user(identity)?.to_string();
        let query = Query::new(paths::GROUP_CHATS)
            .where_array_contains("participants", user_id)
            .order_by("timestamp", Direction::Descending);

        let docs = blocking(&self.db, move |db| {
            db.query(&query).map_err(CoreError::read("list group chats"))
        })
        .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match doc.decode::<GroupChat>() {
                Ok(group) => Some(group),
                Err(e) => {
                    warn!("Skipping malformed group chat: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Post to a group chat. Only participants may post.
    pub async fn send_group_message(
        &self,
        group_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<String, CoreError> {
        paths::check_id("group chat", group_id)?;
        if text.trim().is_empty() {
            return Err(CoreError::InvalidInput("message text is empty".into()));
        }

        let group = group_id.to_string();
        let sender = sender_id.to_string();
        let body = text.to_string();
        let message_id = blocking(&self.db, move |db| {
            db.run_transaction(|tx| {
                let group_path = paths::group_chat(&group);
                let chat: GroupChat = tx
                    .get(&group_path)
                    .map_err(CoreError::read("read group chat"))?
                    .ok_or_else(|| CoreError::NotFound(group_path.clone()))?
                    .decode()
                    .map_err(CoreError::read("decode group chat"))?;

                if !chat.participants.contains(&sender) {
                    return Err(CoreError::Forbidden(format!(
                        "{} is not in group chat {}",
                        sender, group
                    )));
                }

                tx.add_document(
                    &paths::group_chat_messages(&group),
                    fields(json!({
                        "senderID": sender,
                        "text": body,
                        "timestamp": server_timestamp(),
                    })),
                )
                .map_err(CoreError::write("append group message"))
            })
        })
        .await
        .inspect_err(|e| warn!("send_group_message in {} by {} failed: {}", group_id, sender_id, e))?;

        info!("Message {} sent in group chat {} by {}", message_id, group_id, sender_id);
        Ok(message_id)
    }

    /// One-shot ordered message list, for participants only.
    pub async fn group_messages<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
        group_id: &str,
    ) -> Result<Vec<ChatMessage>, CoreError> {
        let user_id = require_user(identity)?.to_string();
        paths::check_id("group chat", group_id)?;

        let group = group_id.to_string();
        let docs = blocking(&self.db, move |db| {
            load_for_participant(db, &group, &user_id)?;
            db.query(&group_messages_query(&group))
                .map_err(CoreError::read("read group messages"))
        })
        .await?;
        Ok(decode_messages(&docs))
    }

    /// The group chat, if `user_id` takes part in it.
    pub async fn group_chat_for(&self, group_id: &str, user_id: &str) -> Result<GroupChat, CoreError> {
        paths::check_id("group chat", group_id)?;
        let group = group_id.to_string();
        let user = user_id.to_string();
        blocking(&self.db, move |db| load_for_participant(db, &group, &user)).await
    }

    /// Live ordered message list of a group chat, as full snapshots.
    pub fn subscribe_group_messages(
        &self,
        group_id: &str,
    ) -> impl Stream<Item = Result<Vec<ChatMessage>, CoreError>> + Send + use<> {
        watch(self.db.clone(), group_messages_query(group_id)).map(|snapshot| {
            snapshot
                .map(|docs| decode_messages(&docs))
                .map_err(CoreError::read("watch group messages"))
        })
    }
}

fn load_for_participant(db: &Database, group_id: &str, user_id: &str) -> Result<GroupChat, CoreError> {
    let group_path = paths::group_chat(group_id);
    let chat: GroupChat = db
        .get(&group_path)
        .map_err(CoreError::read("read group chat"))?
        .ok_or_else(|| CoreError::NotFound(group_path.clone()))?
        .decode()
        .map_err(CoreError::read("decode group chat"))?;
    if !chat.participants.iter().any(|p| p == user_id) {
        return Err(CoreError::Forbidden(format!(
            "{} is not in group chat {}",
            user_id, group_id
        )));
    }
    Ok(chat)
}

fn group_messages_query(group_id: &str) -> Query {
    Query::new(paths::group_chat_messages(group_id)).order_by("timestamp", Direction::Ascending)
}
