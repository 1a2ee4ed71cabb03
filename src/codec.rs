//! Thin wrapper around the `bson` crate.
//!
//! The connection core treats BSON encoding/decoding as an external
//! collaborator with exactly two operations: serialize a document to
//! bytes, deserialize bytes to a document. Everything else in the crate
//! depends on this module rather than on `bson` directly.

use crate::error::{Error, Result};

pub use bson::Document;

/// Serialize a document to its BSON byte representation.
pub fn serialize(doc: &Document) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    doc.to_writer(&mut buf)
        .map_err(|e| Error::ArgumentError(format!("bson encode failed: {e}")))?;
    Ok(buf)
}

/// Deserialize a single document from a byte slice.
///
/// `bytes` must contain exactly one complete BSON document; trailing data
/// is an error since the wire framer already knows each document's length.
pub fn deserialize(bytes: &[u8]) -> Result<Document> {
    Document::from_reader(&mut std::io::Cursor::new(bytes))
        .map_err(|e| Error::ConnectionFailure(format!("bson decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn round_trips_a_document() {
        let original = doc! { "ok": 1, "ismaster": true, "name": "primary" };
        let bytes = serialize(&original).unwrap();
        let decoded = deserialize(&bytes).unwrap();
        assert_eq!(original, decoded);
    }
}
