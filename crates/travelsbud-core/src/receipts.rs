//! Read receipts as a projection of observed message snapshots.
//!
//! A reader never calls "mark read". Each snapshot it observes is folded into
//! [`ReceiptState`], and the fold says which receipt writes to issue.

use travelsbud_types::models::ChatMessage;

/// What the reader has already acknowledged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptState {
    pub last_read_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptEffect {
    /// Persist the reader's receipt as pointing at `last_read_id`, stamped
    /// with the store's time.
    WriteReceipt { last_read_id: String },
}

/// Fold one full, ordered snapshot into the reader's state.
///
/// The newest message in the snapshot becomes the read position. An empty
/// snapshot, or one whose newest message is already acknowledged, produces
/// no effect.
pub fn reduce(state: &ReceiptState, snapshot: &[ChatMessage]) -> (ReceiptState, Vec<ReceiptEffect>) {
    let Some(last) = snapshot.last() else {
        return (state.clone(), Vec::new());
    };

    if state.last_read_id.as_deref() == Some(last.id.as_str()) {
        return (state.clone(), Vec::new());
    }

    let next = ReceiptState {
        last_read_id: Some(last.id.clone()),
    };
    let effects = vec![ReceiptEffect::WriteReceipt {
        last_read_id: last.id.clone(),
    }];
    (next, effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            sender_id: "alice".into(),
            text: format!("text {}", id),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_snapshot_changes_nothing() {
        let (state, effects) = reduce(&ReceiptState::default(), &[]);
        assert_eq!(state, ReceiptState::default());
        assert!(effects.is_empty());
    }

    #[test]
    fn newest_message_becomes_read_position() {
        let (state, effects) = reduce(&ReceiptState::default(), &[msg("m1"), msg("m2")]);
        assert_eq!(state.last_read_id.as_deref(), Some("m2"));
        assert_eq!(
            effects,
            vec![ReceiptEffect::WriteReceipt {
                last_read_id: "m2".into()
            }]
        );
    }

    #[test]
    fn unchanged_tail_is_not_rewritten() {
        let (state, _) = reduce(&ReceiptState::default(), &[msg("m1")]);
        let (again, effects) = reduce(&state, &[msg("m1")]);
        assert_eq!(again, state);
        assert!(effects.is_empty());

        let (next, effects) = reduce(&again, &[msg("m1"), msg("m2")]);
        assert_eq!(next.last_read_id.as_deref(), Some("m2"));
        assert_eq!(effects.len(), 1);
    }
}
