//! The database/collection façade this engine is a client of.
//!
//! `find`, `insert`, `remove`, `command`, and `create_index` are
//! implemented by the higher-level façade, not this crate; the chunked-
//! file engine only needs these four operations on the `files` and
//! `chunks` collections it is opened over.

use crate::error::Result;
use bson::Document;

/// One physical collection (`files` or `chunks`).
pub trait Collection {
    fn find_one(&self, filter: &Document) -> Result<Option<Document>>;
    /// All documents matching `filter`, ordered by `sort` ascending keys
    /// (used to find the last chunk by `n`).
    fn find_sorted(&self, filter: &Document, sort_key: &str, descending: bool) -> Result<Vec<Document>>;
    fn insert(&self, doc: &Document) -> Result<()>;
    fn remove(&self, filter: &Document) -> Result<()>;
    fn create_index(&self, keys: &[(&str, i32)]) -> Result<()>;
}

/// The database a `(files, chunks)` bucket lives in, for server-side
/// commands the chunked-file engine needs (`filemd5` on close).
pub trait Database {
    fn command(&self, doc: &Document) -> Result<Document>;
}
