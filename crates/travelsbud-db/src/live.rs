//! Live queries: full-snapshot streams driven by the store's change feed.

use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::document::Document;
use crate::error::StoreError;
use crate::query::Query;
use crate::{Database, Result};

/// Stream the full result set of `query`: once immediately, then again after
/// every committed write to the query's collection.
///
/// The stream never ends on its own while the store is alive; dropping it
/// releases the subscription. A failed re-query is yielded and ends the
/// stream.
pub fn watch(
    db: Arc<Database>,
    query: Query,
) -> impl Stream<Item = Result<Vec<Document>>> + Send + 'static {
    async_stream::stream! {
        // Subscribe before the first read so no write slips between them.
        let mut changes = db.changes();
        let mut stale = true;

        loop {
            if stale {
                let snapshot = fetch(&db, &query).await;
                let failed = snapshot.is_err();
                yield snapshot;
                if failed {
                    break;
                }
            }

            stale = match changes.recv().await {
                Ok(change) => change.collection == query.collection(),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Watch on {} lagged by {} changes, re-querying", query.collection(), skipped);
                    true
                }
                Err(RecvError::Closed) => break,
            };
        }
    }
}

async fn fetch(db: &Arc<Database>, query: &Query) -> Result<Vec<Document>> {
    let db = db.clone();
    let query = query.clone();
    tokio::task::spawn_blocking(move || db.query(&query))
        .await
        .map_err(|e| StoreError::Background(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Fields, server_timestamp};
    use crate::query::Direction;
    use futures_util::StreamExt;
    use serde_json::json;

    fn text(value: &str) -> Fields {
        json!({ "text": value, "timestamp": server_timestamp() })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn emits_initial_snapshot_then_full_sets() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.add_document("chats/c1/messages", text("first")).unwrap();

        let query = Query::new("chats/c1/messages").order_by("timestamp", Direction::Ascending);
        let mut stream = Box::pin(watch(db.clone(), query));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        // Unrelated collection: no emission for it.
        db.set("chats/c2", Fields::new()).unwrap();
        db.add_document("chats/c1/messages", text("second")).unwrap();

        let second = stream.next().await.unwrap().unwrap();
        let texts: Vec<_> = second.iter().map(|d| d.get_str("text").unwrap()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_the_subscription() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut stream = Box::pin(watch(db.clone(), Query::new("meetups")));
        stream.next().await.unwrap().unwrap();
        assert_eq!(db.changes.receiver_count(), 1);

        drop(stream);
        assert_eq!(db.changes.receiver_count(), 0);
    }
}
