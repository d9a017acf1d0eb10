use rusqlite::{Connection, OptionalExtension};

use crate::document::{self, Document, Fields};
use crate::error::StoreError;
use crate::models::AccountRow;
use crate::query::Query;
use crate::{Database, Result, transaction};

impl Database {
    // -- Documents --
    //
    // Single-document writes are one-statement transactions, so they share
    // the timestamp clock and change feed with `run_transaction`. Reads go
    // straight to the connection and never take the write lock.

    pub fn get(&self, path: &str) -> Result<Option<Document>> {
        document::split_path(path)?;
        self.with_conn(|conn| transaction::query_document(conn, path))
    }

    pub fn set(&self, path: &str, fields: Fields) -> Result<()> {
        self.run_transaction(|tx| tx.set(path, fields))
    }

    pub fn create(&self, path: &str, fields: Fields) -> Result<()> {
        self.run_transaction(|tx| tx.create(path, fields))
    }

    pub fn update(&self, path: &str, fields: Fields) -> Result<()> {
        self.run_transaction(|tx| tx.update(path, fields))
    }

    pub fn merge(&self, path: &str, fields: Fields) -> Result<()> {
        self.run_transaction(|tx| tx.merge(path, fields))
    }

    pub fn add_document(&self, collection: &str, fields: Fields) -> Result<String> {
        self.run_transaction(|tx| tx.add_document(collection, fields))
    }

    pub fn query(&self, query: &Query) -> Result<Vec<Document>> {
        document::check_collection(query.collection())?;
        let docs = self.with_conn(|conn| transaction::query_collection(conn, query.collection()))?;
        Ok(query.apply(docs))
    }

    // -- Accounts --

    pub fn create_account(&self, id: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO accounts (id, email, password) VALUES (?1, ?2, ?3)",
                (id, email, password_hash),
            )?;
            if inserted == 0 {
                return Err(StoreError::DuplicateAccount(email.to_string()));
            }
            Ok(())
        })
    }

    pub fn get_account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account_by_email(conn, email))
    }
}

fn query_account_by_email(conn: &Connection, email: &str) -> Result<Option<AccountRow>> {
    let mut stmt =
        conn.prepare("SELECT id, email, password, created_at FROM accounts WHERE email = ?1")?;

    let row = stmt
        .query_row([email], |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{array_union, fields, server_timestamp};
    use crate::query::Direction;
    use serde_json::json;

    #[test]
    fn set_then_get_round_trips_fields() {
        let db = Database::open_in_memory().unwrap();
        db.set("users/alice/likes/bob", fields(json!({ "liked": true })))
            .unwrap();

        let doc = db.get("users/alice/likes/bob").unwrap().unwrap();
        assert_eq!(doc.id, "bob");
        assert_eq!(doc.get_bool("liked"), Some(true));
        assert_eq!(doc.version, 1);
        assert!(db.get("users/bob/likes/alice").unwrap().is_none());
    }

    #[test]
    fn set_replaces_and_bumps_version() {
        let db = Database::open_in_memory().unwrap();
        db.set("users/alice", fields(json!({ "bio": "hi", "age": "30" })))
            .unwrap();
        db.set("users/alice", fields(json!({ "bio": "hello" }))).unwrap();

        let doc = db.get("users/alice").unwrap().unwrap();
        assert_eq!(doc.get_str("bio"), Some("hello"));
        assert!(doc.get("age").is_none());
        assert_eq!(doc.version, 2);
    }

    #[test]
    fn update_merges_and_requires_existing_document() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .update("chats/c1", fields(json!({ "lastMessage": "x" })))
            .unwrap_err();
        assert!(err.is_not_found());

        db.set(
            "chats/c1",
            fields(json!({ "participantIDs": ["a", "b"], "lastMessage": "" })),
        )
        .unwrap();
        db.update("chats/c1", fields(json!({ "lastMessage": "x" })))
            .unwrap();

        let doc = db.get("chats/c1").unwrap().unwrap();
        assert_eq!(doc.get_str("lastMessage"), Some("x"));
        assert_eq!(doc.get("participantIDs"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let db = Database::open_in_memory().unwrap();
        db.create("chats/c1", Fields::new()).unwrap();
        let err = db.create("chats/c1", Fields::new()).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[test]
    fn add_document_generates_ids_and_stamps_time() {
        let db = Database::open_in_memory().unwrap();
        let a = db
            .add_document(
                "chats/c1/messages",
                fields(json!({ "text": "a", "timestamp": server_timestamp() })),
            )
            .unwrap();
        let b = db
            .add_document(
                "chats/c1/messages",
                fields(json!({ "text": "b", "timestamp": server_timestamp() })),
            )
            .unwrap();
        assert_ne!(a, b);

        let first = db.get(&format!("chats/c1/messages/{}", a)).unwrap().unwrap();
        let second = db.get(&format!("chats/c1/messages/{}", b)).unwrap().unwrap();
        assert!(first.get_str("timestamp").unwrap() < second.get_str("timestamp").unwrap());
    }

    #[test]
    fn invalid_paths_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.set("chats", Fields::new()),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(matches!(
            db.add_document("chats/c1", Fields::new()),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn query_filters_orders_and_limits() {
        let db = Database::open_in_memory().unwrap();
        db.set(
            "groupChats/g1",
            fields(json!({ "title": "hike", "participants": ["a", "b"], "rank": 2 })),
        )
        .unwrap();
        db.set(
            "groupChats/g2",
            fields(json!({ "title": "surf", "participants": ["b"], "rank": 1 })),
        )
        .unwrap();
        db.set(
            "groupChats/g3",
            fields(json!({ "title": "dive", "participants": ["a"], "rank": 3 })),
        )
        .unwrap();

        let q = Query::new("groupChats")
            .where_array_contains("participants", "a")
            .order_by("rank", Direction::Descending);
        let ids: Vec<String> = db.query(&q).unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["g3", "g1"]);

        let q = Query::new("groupChats")
            .order_by("rank", Direction::Ascending)
            .limit(2);
        let ids: Vec<String> = db.query(&q).unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["g2", "g1"]);

        let q = Query::new("groupChats").where_eq("title", "surf");
        assert_eq!(db.query(&q).unwrap().len(), 1);
    }

    #[test]
    fn array_union_through_update() {
        let db = Database::open_in_memory().unwrap();
        db.set("meetups/m1", fields(json!({ "attendees": ["a"] })))
            .unwrap();
        db.update("meetups/m1", fields(json!({ "attendees": array_union(["b"]) })))
            .unwrap();
        db.update("meetups/m1", fields(json!({ "attendees": array_union(["b"]) })))
            .unwrap();

        let doc = db.get("meetups/m1").unwrap().unwrap();
        assert_eq!(doc.get("attendees"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn merge_creates_then_merges() {
        let db = Database::open_in_memory().unwrap();
        db.merge("users/alice", fields(json!({ "fcmToken": "t1" })))
            .unwrap();
        db.merge("users/alice", fields(json!({ "bio": "hi" }))).unwrap();

        let doc = db.get("users/alice").unwrap().unwrap();
        assert_eq!(doc.get_str("fcmToken"), Some("t1"));
        assert_eq!(doc.get_str("bio"), Some("hi"));
    }

    #[test]
    fn accounts_are_unique_by_email() {
        let db = Database::open_in_memory().unwrap();
        db.create_account("u1", "a@example.com", "hash").unwrap();
        let err = db.create_account("u2", "a@example.com", "hash").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateAccount(_)));

        let row = db.get_account_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(row.id, "u1");
        assert!(db.get_account_by_email("b@example.com").unwrap().is_none());
    }
}
