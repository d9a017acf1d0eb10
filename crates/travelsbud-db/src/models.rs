//! Database row types. These map directly to SQLite rows and stay distinct
//! from the document and API types.

pub struct DocumentRow {
    pub path: String,
    pub doc_id: String,
    pub fields: String,
    pub version: i64,
    pub seq: i64,
}

pub struct AccountRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}
