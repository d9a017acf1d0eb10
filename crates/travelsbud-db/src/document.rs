use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::StoreError;
use crate::models::DocumentRow;

pub type Fields = serde_json::Map<String, Value>;

/// Marker key of a write-time transform. Mirrors the managed backend's
/// server-value convention so documents written by other tools resolve the same.
const SENTINEL_KEY: &str = ".sv";

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub fields: Fields,
    /// Bumped on every write to this path.
    pub version: i64,
    /// Store-wide insertion order, used to break order-by ties.
    pub(crate) seq: i64,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    /// Deserialize the fields into `T`. The document id is offered to `T` as
    /// an `id` field; types without one ignore it.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields.insert("id".into(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields)).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })
    }
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let fields = match serde_json::from_str::<Value>(&row.fields) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => {
                return Err(StoreError::Malformed {
                    path: row.path,
                    source: serde::de::Error::custom("document body is not an object"),
                });
            }
            Err(source) => return Err(StoreError::Malformed { path: row.path, source }),
        };

        Ok(Self {
            id: row.doc_id,
            path: row.path,
            fields,
            version: row.version,
            seq: row.seq,
        })
    }
}

/// Convert an object literal into `Fields`. Anything but an object yields
/// an empty map.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

// -- Paths --

/// Split a document path into (collection path, document id).
/// Document paths have an even number of non-empty segments.
pub fn split_path(path: &str) -> Result<(&str, &str), StoreError> {
    let segments = path.split('/').count();
    if segments < 2 || segments % 2 != 0 || path.split('/').any(str::is_empty) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let idx = path
        .rfind('/')
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
    Ok((&path[..idx], &path[idx + 1..]))
}

/// Collection paths have an odd number of non-empty segments.
pub fn check_collection(path: &str) -> Result<(), StoreError> {
    let segments = path.split('/').count();
    if segments % 2 == 0 || path.split('/').any(str::is_empty) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

// -- Timestamps --

/// RFC 3339, UTC, fixed microsecond precision: lexicographic order is
/// chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// -- Write-time sentinels --

/// Replaced by the commit timestamp of the write.
pub fn server_timestamp() -> Value {
    json!({ SENTINEL_KEY: "timestamp" })
}

/// Appends each value not already present in the stored array.
pub fn array_union<I, V>(values: I) -> Value
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    let values: Vec<Value> = values.into_iter().map(Into::into).collect();
    json!({ SENTINEL_KEY: { "arrayUnion": values } })
}

/// Removes every occurrence of each value from the stored array.
pub fn array_remove<I, V>(values: I) -> Value
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    let values: Vec<Value> = values.into_iter().map(Into::into).collect();
    json!({ SENTINEL_KEY: { "arrayRemove": values } })
}

enum Sentinel {
    Timestamp,
    Union(Vec<Value>),
    Remove(Vec<Value>),
}

fn sentinel(value: &Value) -> Option<Sentinel> {
    let op = value
        .as_object()
        .filter(|map| map.len() == 1)?
        .get(SENTINEL_KEY)?;

    match op {
        Value::String(s) if s == "timestamp" => Some(Sentinel::Timestamp),
        Value::Object(op) => match (op.get("arrayUnion"), op.get("arrayRemove")) {
            (Some(Value::Array(values)), None) => Some(Sentinel::Union(values.clone())),
            (None, Some(Value::Array(values))) => Some(Sentinel::Remove(values.clone())),
            _ => None,
        },
        _ => None,
    }
}

/// Resolve top-level sentinels in `fields` against the stored `base`.
pub(crate) fn resolve_sentinels(base: Option<&Fields>, fields: Fields, now: &str) -> Fields {
    fields
        .into_iter()
        .map(|(key, value)| {
            let current = base.and_then(|b| b.get(&key));
            let resolved = resolve_value(current, value, now);
            (key, resolved)
        })
        .collect()
}

fn resolve_value(current: Option<&Value>, value: Value, now: &str) -> Value {
    let existing = || match current {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    match sentinel(&value) {
        None => value,
        Some(Sentinel::Timestamp) => Value::String(now.to_string()),
        Some(Sentinel::Union(add)) => {
            let mut items = existing();
            for v in add {
                if !items.contains(&v) {
                    items.push(v);
                }
            }
            Value::Array(items)
        }
        Some(Sentinel::Remove(remove)) => {
            let mut items = existing();
            items.retain(|v| !remove.contains(v));
            Value::Array(items)
        }
    }
}
