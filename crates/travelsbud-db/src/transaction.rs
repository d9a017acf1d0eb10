use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use crate::Result;
use crate::document::{self, Document, Fields};
use crate::error::StoreError;
use crate::models::DocumentRow;
use crate::query::Query;

/// Reads and writes applied atomically by [`crate::Database::run_transaction`].
///
/// All writes in one transaction share a single server timestamp.
pub struct Transaction<'a> {
    tx: rusqlite::Transaction<'a>,
    now: String,
    touched: BTreeSet<String>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn begin(conn: &'a mut Connection, now: DateTime<Utc>) -> Result<Self> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(Self {
            tx,
            now: document::format_timestamp(now),
            touched: BTreeSet::new(),
        })
    }

    /// Commit and return the collections written to.
    pub(crate) fn commit(self) -> Result<BTreeSet<String>> {
        self.tx.commit()?;
        Ok(self.touched)
    }

    pub fn get(&self, path: &str) -> Result<Option<Document>> {
        document::split_path(path)?;
        query_document(&self.tx, path)
    }

    pub fn query(&self, query: &Query) -> Result<Vec<Document>> {
        document::check_collection(query.collection())?;
        let docs = query_collection(&self.tx, query.collection())?;
        Ok(query.apply(docs))
    }

    /// Replace the document at `path`, creating it if absent.
    pub fn set(&mut self, path: &str, fields: Fields) -> Result<()> {
        let (collection, doc_id) = document::split_path(path)?;
        let fields = document::resolve_sentinels(None, fields, &self.now);
        let body = serde_json::Value::Object(fields).to_string();

        self.tx.execute(
            "INSERT INTO documents (path, collection, doc_id, fields, version, seq, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, (SELECT COALESCE(MAX(seq), 0) + 1 FROM documents), ?5, ?5)
             ON CONFLICT(path) DO UPDATE SET
                fields = excluded.fields,
                version = documents.version + 1,
                updated_at = excluded.updated_at",
            rusqlite::params![path, collection, doc_id, body, self.now],
        )?;

        self.touched.insert(collection.to_string());
        Ok(())
    }

    /// Create the document at `path`; fails if it already exists.
    pub fn create(&mut self, path: &str, fields: Fields) -> Result<()> {
        if self.get(path)?.is_some() {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        self.set(path, fields)
    }

    /// Merge `fields` into the existing document; fails if it is absent.
    pub fn update(&mut self, path: &str, fields: Fields) -> Result<()> {
        let (collection, _) = document::split_path(path)?;
        let existing = self
            .get(path)?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        let resolved = document::resolve_sentinels(Some(&existing.fields), fields, &self.now);
        let mut merged = existing.fields;
        merged.extend(resolved);
        let body = serde_json::Value::Object(merged).to_string();

        self.tx.execute(
            "UPDATE documents SET fields = ?2, version = version + 1, updated_at = ?3 WHERE path = ?1",
            rusqlite::params![path, body, self.now],
        )?;

        self.touched.insert(collection.to_string());
        Ok(())
    }

    /// Merge `fields` into the document, creating it if absent.
    pub fn merge(&mut self, path: &str, fields: Fields) -> Result<()> {
        if self.get(path)?.is_some() {
            self.update(path, fields)
        } else {
            self.set(path, fields)
        }
    }

    /// Add a document with a generated id to `collection`. Returns the id.
    pub fn add_document(&mut self, collection: &str, fields: Fields) -> Result<String> {
        document::check_collection(collection)?;
        let id = Uuid::new_v4().to_string();
        self.set(&format!("{}/{}", collection, id), fields)?;
        Ok(id)
    }
}

pub(crate) fn query_document(conn: &Connection, path: &str) -> Result<Option<Document>> {
    let mut stmt = conn.prepare(
        "SELECT path, doc_id, fields, version, seq FROM documents WHERE path = ?1",
    )?;

    let row = stmt.query_row([path], read_row).optional()?;
    row.map(Document::try_from).transpose()
}

pub(crate) fn query_collection(conn: &Connection, collection: &str) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(
        "SELECT path, doc_id, fields, version, seq FROM documents
         WHERE collection = ?1
         ORDER BY seq ASC",
    )?;

    let rows = stmt
        .query_map([collection], read_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(Document::try_from).collect()
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        path: row.get(0)?,
        doc_id: row.get(1)?,
        fields: row.get(2)?,
        version: row.get(3)?,
        seq: row.get(4)?,
    })
}
