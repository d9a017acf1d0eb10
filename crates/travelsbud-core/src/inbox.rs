use std::sync::Arc;

use tracing::warn;

use travelsbud_db::{Database, Direction, Query};
use travelsbud_types::models::ConversationIndexEntry;

use crate::error::CoreError;
use crate::identity::{IdentityProvider, require_user};
use crate::{blocking, paths};

/// The signed-in user's conversation list.
#[derive(Clone)]
pub struct Inbox {
    db: Arc<Database>,
}

impl Inbox {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Newest first.
    pub async fn list_conversations<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
    ) -> Result<Vec<ConversationIndexEntry>, CoreError> {
        let user_id = require_user(identity)?;
        let query = Query::new(paths::user_chats(user_id)).order_by("timestamp", Direction::Descending);

        let docs = blocking(&self.db, move |db| {
            db.query(&query).map_err(CoreError::read("list conversations"))
        })
        .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match doc.decode::<ConversationIndexEntry>() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping malformed inbox entry: {}", e);
                    None
                }
            })
            .collect())
    }
}
