use std::sync::Arc;

use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use travelsbud_db::{Database, Transaction, fields, server_timestamp};

use crate::error::CoreError;
use crate::identity::IdentityProvider;
use crate::{blocking, paths};

/// What a like did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeOutcome {
    /// Recorded; the other user has not liked back (yet).
    Pending,
    /// Both directions exist. `newly_created` is false when the conversation
    /// came from an earlier match of the same pair.
    Matched {
        conversation_id: String,
        newly_created: bool,
    },
    /// Acting and target user are the same. Nothing was written.
    SelfLikeRejected,
}

impl LikeOutcome {
    pub fn is_mutual_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::Matched {
                conversation_id, ..
            } => Some(conversation_id),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Matched { .. } => "matched",
            Self::SelfLikeRejected => "self_like_rejected",
        }
    }
}

/// Collapse a like result to the plain match flag. Every failure reads as
/// `false`; inspect the result itself to tell failures from pending likes.
pub fn is_mutual_match(result: &Result<LikeOutcome, CoreError>) -> bool {
    matches!(result, Ok(outcome) if outcome.is_mutual_match())
}

/// Conversation id for an unordered pair: SHA-256 over the ids in canonical
/// order. One pair, one id, so the store itself rejects a second creation.
pub fn conversation_id_for(a: &str, b: &str) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(low.as_bytes());
    hasher.update([0u8]);
    hasher.update(high.as_bytes());
    hex::encode(hasher.finalize())
}

/// Records likes and provisions a conversation on reciprocity.
#[derive(Clone)]
pub struct Matcher {
    db: Arc<Database>,
}

impl Matcher {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record that `acting_user_id` likes `target_user_id` and, if the
    /// reverse like exists, make sure exactly one conversation exists for
    /// the pair. The whole sequence is one store transaction.
    pub async fn record_like<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
        acting_user_id: &str,
        target_user_id: &str,
    ) -> Result<LikeOutcome, CoreError> {
        if identity.current_user_id() != Some(acting_user_id) || acting_user_id.is_empty() {
            warn!("record_like: {:?} is not the signed-in user", acting_user_id);
            return Err(CoreError::Unauthenticated);
        }
        paths::check_id("user", target_user_id)?;

        if acting_user_id == target_user_id {
            info!("record_like: {} tried to like themselves", acting_user_id);
            return Ok(LikeOutcome::SelfLikeRejected);
        }

        let acting = acting_user_id.to_string();
        let target = target_user_id.to_string();
        let result = blocking(&self.db, move |db| {
            db.run_transaction(|tx| like_and_match(tx, &acting, &target))
        })
        .await;

        match &result {
            Ok(LikeOutcome::Matched {
                conversation_id,
                newly_created: true,
            }) => info!(
                "Mutual match {} <-> {}: conversation {}",
                acting_user_id, target_user_id, conversation_id
            ),
            Ok(outcome) => info!(
                "record_like {} -> {}: {}",
                acting_user_id,
                target_user_id,
                outcome.label()
            ),
            Err(e) => error!(
                "record_like {} -> {} failed: {}",
                acting_user_id, target_user_id, e
            ),
        }
        result
    }
}

fn like_and_match(
    tx: &mut Transaction<'_>,
    acting: &str,
    target: &str,
) -> Result<LikeOutcome, CoreError> {
    tx.set(&paths::like_edge(acting, target), fields(json!({ "liked": true })))
        .map_err(CoreError::write("write like edge"))?;

    let liked_back = tx
        .get(&paths::like_edge(target, acting))
        .map_err(CoreError::read("read reciprocal like"))?
        .and_then(|doc| doc.get_bool("liked"))
        .unwrap_or(false);

    if !liked_back {
        return Ok(LikeOutcome::Pending);
    }

    let conversation_id = conversation_id_for(acting, target);
    let chat_path = paths::chat(&conversation_id);

    let exists = tx
        .get(&chat_path)
        .map_err(CoreError::read("read conversation"))?
        .is_some();
    if exists {
        return Ok(LikeOutcome::Matched {
            conversation_id,
            newly_created: false,
        });
    }

    tx.create(
        &chat_path,
        fields(json!({
            "participantIDs": [acting, target],
            "lastMessage": "",
            "timestamp": server_timestamp(),
        })),
    )
    .map_err(CoreError::write("create conversation"))?;

    // Each inbox row is titled after the other participant.
    for (owner, other) in [(acting, target), (target, acting)] {
        tx.set(
            &paths::user_chat(owner, &conversation_id),
            fields(json!({
                "title": format!("Chat with {}", other),
                "timestamp": server_timestamp(),
            })),
        )
        .map_err(CoreError::write("create inbox entry"))?;
    }

    Ok(LikeOutcome::Matched {
        conversation_id,
        newly_created: true,
    })
}
