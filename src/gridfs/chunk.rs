//! The chunk document shape: `{_id, files_id, n, data}`.

use bson::{Bson, Document};

/// A single fixed-size slice of a logical file.
///
/// `data` is raw bytes, not a wrapper type — the chunk is re-serialized
/// wholesale on every persist rather than incrementally patched.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: Bson,
    pub files_id: Bson,
    pub n: i64,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn new(files_id: Bson, n: i64) -> Self {
        Chunk {
            id: Bson::ObjectId(bson::oid::ObjectId::new()),
            files_id,
            n,
            data: Vec::new(),
        }
    }

    pub fn from_document(doc: &Document) -> Option<Self> {
        let id = doc.get("_id")?.clone();
        let files_id = doc.get("files_id")?.clone();
        let n = doc.get_i64("n").ok().or_else(|| doc.get_i32("n").ok().map(i64::from))?;
        let data = match doc.get("data")? {
            Bson::Binary(bin) => bin.bytes.clone(),
            _ => return None,
        };
        Some(Chunk {
            id,
            files_id,
            n,
            data,
        })
    }

    pub fn to_document(&self) -> Document {
        bson::doc! {
            "_id": self.id.clone(),
            "files_id": self.files_id.clone(),
            "n": self.n,
            "data": Bson::Binary(bson::Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: self.data.clone(),
            }),
        }
    }

    /// `{files_id, n}` filter, as used both for lookups and the
    /// delete-then-insert persistence discipline.
    pub fn selector(files_id: &Bson, n: i64) -> Document {
        bson::doc! { "files_id": files_id.clone(), "n": n }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_document() {
        let chunk = Chunk {
            id: Bson::ObjectId(bson::oid::ObjectId::new()),
            files_id: Bson::Int64(7),
            n: 3,
            data: vec![1, 2, 3, 4],
        };
        let doc = chunk.to_document();
        let decoded = Chunk::from_document(&doc).unwrap();
        assert_eq!(decoded.files_id, chunk.files_id);
        assert_eq!(decoded.n, chunk.n);
        assert_eq!(decoded.data, chunk.data);
    }
}
