//! Chunked-file engine: a seekable, position-tracked stream over an
//! ordered sequence of chunk documents.

use crate::error::{Error, Result};
use crate::gridfs::chunk::Chunk;
use crate::gridfs::collection::{Collection, Database};
use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};

pub const DEFAULT_CHUNK_SIZE: usize = 262_144;
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// `"r" | "w" | "w+"` as a closed, tagged variant rather than a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
    WritePlus,
}

impl Mode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "r" => Ok(Mode::Read),
            "w" => Ok(Mode::Write),
            "w+" => Ok(Mode::WritePlus),
            other => Err(Error::GridError(format!("unrecognized file mode '{other}'"))),
        }
    }

    fn is_write(self) -> bool {
        matches!(self, Mode::Write | Mode::WritePlus)
    }
}

/// Absolute offset, the chunk under construction or last fetched, and
/// the offset within that chunk's data.
struct CursorState {
    file_position: u64,
    current_chunk: Chunk,
    chunk_position: usize,
}

/// Open-time options.
pub struct OpenOptions {
    pub chunk_size: usize,
    pub content_type: String,
    pub files_id: Option<Bson>,
    pub metadata: Option<Document>,
    /// Extra selector fields merged into the `files` lookup alongside
    /// `filename`, so a caller can disambiguate same-named files.
    pub criteria: Document,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            files_id: None,
            metadata: None,
            criteria: Document::new(),
        }
    }
}

pub struct ChunkedFile<'a> {
    files: &'a dyn Collection,
    chunks: &'a dyn Collection,
    db: &'a dyn Database,

    filename: String,
    mode: Mode,
    files_id: Bson,
    chunk_size: usize,
    content_type: String,
    metadata: Option<Document>,
    length: u64,
    upload_date: Option<DateTime<Utc>>,
    existing: bool,

    cursor: CursorState,
}

impl<'a> ChunkedFile<'a> {
    /// Open `filename` against `(files, chunks)` in `mode`.
    pub fn open(
        files: &'a dyn Collection,
        chunks: &'a dyn Collection,
        db: &'a dyn Database,
        filename: &str,
        mode_str: &str,
        options: OpenOptions,
    ) -> Result<Self> {
        let mode = Mode::parse(mode_str)?;

        let mut selector = options.criteria.clone();
        selector.insert("filename", filename);
        let existing_doc = files.find_one(&selector)?;

        let (files_id, chunk_size, content_type, metadata, length, upload_date, existing) =
            match &existing_doc {
                Some(doc) => {
                    let files_id = doc
                        .get("_id")
                        .cloned()
                        .ok_or_else(|| Error::GridError("files document missing _id".to_string()))?;
                    let chunk_size = doc
                        .get_i64("chunkSize")
                        .map(|v| v as usize)
                        .unwrap_or(options.chunk_size);
                    let content_type = doc
                        .get_str("contentType")
                        .map(|s| s.to_string())
                        .unwrap_or_else(|_| options.content_type.clone());
                    let metadata = doc.get_document("metadata").ok().cloned();
                    let length = doc.get_i64("length").map(|v| v as u64).unwrap_or(0);
                    let upload_date = doc.get_datetime("uploadDate").ok().map(|d| d.to_chrono());
                    (files_id, chunk_size, content_type, metadata, length, upload_date, true)
                }
                None => {
                    let files_id = options
                        .files_id
                        .clone()
                        .unwrap_or_else(|| Bson::ObjectId(bson::oid::ObjectId::new()));
                    (
                        files_id,
                        options.chunk_size,
                        options.content_type.clone(),
                        options.metadata.clone(),
                        0,
                        None,
                        false,
                    )
                }
            };

        let cursor = match mode {
            Mode::Read => {
                if !existing {
                    return Err(Error::GridError(format!(
                        "no such file '{filename}' to open for reading"
                    )));
                }
                let current_chunk = get_chunk(chunks, &files_id, 0)?
                    .unwrap_or_else(|| Chunk::new(files_id.clone(), 0));
                CursorState {
                    file_position: 0,
                    current_chunk,
                    chunk_position: 0,
                }
            }
            Mode::Write => {
                chunks.remove(&doc! { "files_id": files_id.clone() })?;
                ensure_chunk_index(chunks)?;
                CursorState {
                    file_position: 0,
                    current_chunk: Chunk::new(files_id.clone(), 0),
                    chunk_position: 0,
                }
            }
            Mode::WritePlus => {
                ensure_chunk_index(chunks)?;
                let last = last_chunk(chunks, &files_id)?;
                let current_chunk = match last {
                    Some(chunk) => chunk,
                    None => Chunk::new(files_id.clone(), 0),
                };
                let chunk_position = current_chunk.data.len();
                CursorState {
                    file_position: length,
                    current_chunk,
                    chunk_position,
                }
            }
        };

        Ok(ChunkedFile {
            files,
            chunks,
            db,
            filename: filename.to_string(),
            mode,
            files_id,
            chunk_size,
            content_type,
            metadata,
            length,
            upload_date,
            existing,
            cursor,
        })
    }

    pub fn tell(&self) -> u64 {
        self.cursor.file_position
    }

    /// `length == None` with the cursor at the start is the whole-file
    /// fast path; otherwise bytes are accumulated starting at the current
    /// position, advancing across chunk boundaries as needed.
    pub fn read(&mut self, length: Option<usize>) -> Result<Vec<u8>> {
        if length == Some(0) {
            return Ok(Vec::new());
        }

        if length.is_none() && self.cursor.file_position == 0 {
            let last_n = self.last_chunk_number();
            let mut out = self.cursor.current_chunk.data.clone();
            while self.cursor.current_chunk.n < last_n {
                let next = get_chunk(self.chunks, &self.files_id, self.cursor.current_chunk.n + 1)?
                    .ok_or_else(|| {
                        Error::ConnectionFailure(format!(
                            "missing chunk {} for file '{}'",
                            self.cursor.current_chunk.n + 1,
                            self.filename
                        ))
                    })?;
                out.extend_from_slice(&next.data);
                self.cursor.current_chunk = next;
            }
            self.cursor.file_position = self.length;
            self.cursor.chunk_position = self.cursor.current_chunk.data.len();
            return Ok(out);
        }

        let mut remaining = length.unwrap_or(usize::MAX);
        let mut out = Vec::new();

        loop {
            if remaining == 0 {
                break;
            }
            let available = self.cursor.current_chunk.data.len().saturating_sub(self.cursor.chunk_position);
            if available == 0 {
                let next_n = self.cursor.current_chunk.n + 1;
                match get_chunk(self.chunks, &self.files_id, next_n)? {
                    Some(next) => {
                        self.cursor.current_chunk = next;
                        self.cursor.chunk_position = 0;
                        continue;
                    }
                    None => break, // past the final chunk: return what we have
                }
            }
            let take = available.min(remaining);
            let start = self.cursor.chunk_position;
            out.extend_from_slice(&self.cursor.current_chunk.data[start..start + take]);
            self.cursor.chunk_position += take;
            self.cursor.file_position += take as u64;
            remaining -= take;
        }

        Ok(out)
    }

    /// Append `bytes` to the file. Requires a write mode.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        if !self.mode.is_write() {
            return Err(Error::GridError("write requires mode 'w' or 'w+'".to_string()));
        }

        let mut remaining = bytes;
        let mut written = 0;

        while !remaining.is_empty() {
            if self.cursor.chunk_position == self.chunk_size {
                self.persist_current_chunk()?;
                self.cursor.current_chunk = Chunk::new(self.files_id.clone(), self.cursor.current_chunk.n + 1);
                self.cursor.chunk_position = 0;
            }

            let room = self.chunk_size - self.cursor.chunk_position;
            let take = room.min(remaining.len());
            self.cursor.current_chunk.data.extend_from_slice(&remaining[..take]);
            self.cursor.chunk_position += take;
            self.cursor.file_position += take as u64;
            written += take;
            remaining = &remaining[take..];

            self.persist_current_chunk()?;
        }

        Ok(written)
    }

    /// Seek within a read-mode file.
    pub fn seek(&mut self, pos: i64, whence: SeekFrom) -> Result<u64> {
        if self.mode.is_write() {
            return Err(Error::GridError("seek is not permitted in write mode".to_string()));
        }

        let base: i64 = match whence {
            SeekFrom::Start => 0,
            SeekFrom::Current => self.cursor.file_position as i64,
            SeekFrom::End => self.length as i64,
        };
        let target = base + pos;
        if target < 0 {
            return Err(Error::ArgumentError("seek target is negative".to_string()));
        }
        let target = target as u64;

        let target_n = (target / self.chunk_size as u64) as i64;
        if target_n != self.cursor.current_chunk.n {
            let chunk = get_chunk(self.chunks, &self.files_id, target_n)?
                .unwrap_or_else(|| Chunk::new(self.files_id.clone(), target_n));
            self.cursor.current_chunk = chunk;
        }
        self.cursor.file_position = target;
        self.cursor.chunk_position = (target % self.chunk_size as u64) as usize;
        Ok(self.cursor.file_position)
    }

    /// Finalize metadata on close. A no-op in read mode.
    pub fn close(mut self) -> Result<()> {
        if !self.mode.is_write() {
            return Ok(());
        }

        self.length = self.cursor.current_chunk.n as u64 * self.chunk_size as u64
            + self.cursor.chunk_position as u64;

        let upload_date = self.upload_date.unwrap_or_else(chrono::Utc::now);
        self.upload_date = Some(upload_date);

        let md5 = self.request_md5()?;

        let files_doc = doc! {
            "_id": self.files_id.clone(),
            "filename": self.filename.clone(),
            "contentType": self.content_type.clone(),
            "length": self.length as i64,
            "chunkSize": self.chunk_size as i64,
            "uploadDate": bson::DateTime::from_chrono(upload_date),
            "aliases": Bson::Null,
            "metadata": self.metadata.clone().unwrap_or_default(),
            "md5": md5,
        };

        if self.existing {
            self.files.remove(&doc! { "_id": self.files_id.clone() })?;
        }
        self.files.insert(&files_doc)?;
        Ok(())
    }

    fn persist_current_chunk(&self) -> Result<()> {
        self.chunks
            .remove(&Chunk::selector(&self.files_id, self.cursor.current_chunk.n))?;
        self.chunks.insert(&self.cursor.current_chunk.to_document())?;
        Ok(())
    }

    fn last_chunk_number(&self) -> i64 {
        if self.length == 0 {
            0
        } else {
            ((self.length - 1) / self.chunk_size as u64) as i64
        }
    }

    fn request_md5(&self) -> Result<String> {
        let reply = self.db.command(&doc! {
            "filemd5": self.files_id.clone(),
            "root": "fs",
        })?;
        reply
            .get_str("md5")
            .map(|s| s.to_string())
            .map_err(|_| Error::ConnectionFailure("filemd5 command returned no digest".to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SeekFrom {
    Start,
    Current,
    End,
}

fn get_chunk(chunks: &dyn Collection, files_id: &Bson, n: i64) -> Result<Option<Chunk>> {
    let doc = chunks.find_one(&Chunk::selector(files_id, n))?;
    Ok(doc.as_ref().and_then(Chunk::from_document))
}

fn last_chunk(chunks: &dyn Collection, files_id: &Bson) -> Result<Option<Chunk>> {
    let docs = chunks.find_sorted(&doc! { "files_id": files_id.clone() }, "n", true)?;
    Ok(docs.first().and_then(Chunk::from_document))
}

fn ensure_chunk_index(chunks: &dyn Collection) -> Result<()> {
    chunks.create_index(&[("files_id", 1), ("n", 1)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory stand-in for the database/collection façade, good
    /// enough to exercise the chunked-file engine's own logic.
    #[derive(Default)]
    struct MemCollection {
        docs: RefCell<HashMap<String, Document>>,
    }

    fn doc_key(doc: &Document) -> String {
        format!("{:?}", doc.get("_id").or_else(|| doc.get("files_id")).cloned())
    }

    impl Collection for MemCollection {
        fn find_one(&self, filter: &Document) -> Result<Option<Document>> {
            let docs = self.docs.borrow();
            for doc in docs.values() {
                if matches(doc, filter) {
                    return Ok(Some(doc.clone()));
                }
            }
            Ok(None)
        }

        fn find_sorted(&self, filter: &Document, sort_key: &str, descending: bool) -> Result<Vec<Document>> {
            let docs = self.docs.borrow();
            let mut matched: Vec<Document> = docs.values().filter(|d| matches(d, filter)).cloned().collect();
            matched.sort_by_key(|d| d.get_i64(sort_key).unwrap_or(0));
            if descending {
                matched.reverse();
            }
            Ok(matched)
        }

        fn insert(&self, doc: &Document) -> Result<()> {
            self.docs.borrow_mut().insert(unique_key(doc), doc.clone());
            Ok(())
        }

        fn remove(&self, filter: &Document) -> Result<()> {
            self.docs.borrow_mut().retain(|_, d| !matches(d, filter));
            Ok(())
        }

        fn create_index(&self, _keys: &[(&str, i32)]) -> Result<()> {
            Ok(())
        }
    }

    fn unique_key(doc: &Document) -> String {
        if let Some(n) = doc.get("n") {
            format!("{:?}:{:?}", doc.get("files_id"), n)
        } else {
            doc_key(doc)
        }
    }

    fn matches(doc: &Document, filter: &Document) -> bool {
        filter.iter().all(|(k, v)| doc.get(k) == Some(v))
    }

    struct MemDb;
    impl Database for MemDb {
        fn command(&self, doc: &Document) -> Result<Document> {
            if doc.contains_key("filemd5") {
                return Ok(bson::doc! { "md5": "deadbeef", "ok": 1 });
            }
            Ok(bson::doc! { "ok": 1 })
        }
    }

    #[test]
    fn write_then_read_round_trips_across_chunk_boundaries() {
        let files = MemCollection::default();
        let chunks = MemCollection::default();
        let db = MemDb;

        let payload = vec![7u8; 614_016]; // matches the three-chunk scenario: 262144 + 262144 + 89728
        let opts = OpenOptions {
            chunk_size: 256 * 1024,
            ..OpenOptions::default()
        };

        {
            let mut file = ChunkedFile::open(&files, &chunks, &db, "big.bin", "w", opts).unwrap();
            let written = file.write(&payload).unwrap();
            assert_eq!(written, payload.len());
            file.close().unwrap();
        }

        let files_doc = files.find_one(&doc! { "filename": "big.bin" }).unwrap().unwrap();
        assert_eq!(files_doc.get_i64("length").unwrap() as usize, payload.len());

        let all_chunks = chunks
            .find_sorted(&doc! {}, "n", false)
            .unwrap();
        assert_eq!(all_chunks.len(), 3);
        let sizes: Vec<usize> = all_chunks
            .iter()
            .map(|d| Chunk::from_document(d).unwrap().data.len())
            .collect();
        assert_eq!(sizes, vec![262144, 262144, 89728]);

        let mut reader = ChunkedFile::open(&files, &chunks, &db, "big.bin", "r", OpenOptions::default()).unwrap();
        let read_back = reader.read(None).unwrap();
        assert_eq!(read_back, payload);
    }

    #[test]
    fn partial_read_advances_cursor_across_chunk_boundaries() {
        let files = MemCollection::default();
        let chunks = MemCollection::default();
        let db = MemDb;

        let mut payload = vec![1u8; 10];
        payload.extend(vec![2u8; 10]);
        let opts = OpenOptions {
            chunk_size: 10,
            ..OpenOptions::default()
        };
        {
            let mut file = ChunkedFile::open(&files, &chunks, &db, "f", "w", opts).unwrap();
            file.write(&payload).unwrap();
            file.close().unwrap();
        }

        let mut reader = ChunkedFile::open(&files, &chunks, &db, "f", "r", OpenOptions::default()).unwrap();
        let first = reader.read(Some(15)).unwrap();
        assert_eq!(first, payload[0..15]);
        assert_eq!(reader.tell(), 15);

        let second = reader.read(Some(10)).unwrap();
        assert_eq!(second, payload[15..20]);
        assert_eq!(reader.tell(), 20);
    }

    #[test]
    fn write_mode_deletes_prior_chunks_by_files_id() {
        let files = MemCollection::default();
        let chunks = MemCollection::default();
        let db = MemDb;

        {
            let mut file =
                ChunkedFile::open(&files, &chunks, &db, "f", "w", OpenOptions::default()).unwrap();
            file.write(b"first").unwrap();
            file.close().unwrap();
        }
        {
            let mut file =
                ChunkedFile::open(&files, &chunks, &db, "f", "w", OpenOptions::default()).unwrap();
            file.write(b"second-version").unwrap();
            file.close().unwrap();
        }

        let all_chunks = chunks.find_sorted(&doc! {}, "n", false).unwrap();
        assert_eq!(all_chunks.len(), 1);
        assert_eq!(
            Chunk::from_document(&all_chunks[0]).unwrap().data,
            b"second-version"
        );
    }

    #[test]
    fn write_on_read_mode_file_is_a_grid_error() {
        let files = MemCollection::default();
        let chunks = MemCollection::default();
        let db = MemDb;
        {
            let mut file =
                ChunkedFile::open(&files, &chunks, &db, "f", "w", OpenOptions::default()).unwrap();
            file.write(b"data").unwrap();
            file.close().unwrap();
        }
        let mut reader = ChunkedFile::open(&files, &chunks, &db, "f", "r", OpenOptions::default()).unwrap();
        let err = reader.write(b"nope").unwrap_err();
        assert!(matches!(err, Error::GridError(_)));
    }

    #[test]
    fn unrecognized_mode_is_a_grid_error() {
        let files = MemCollection::default();
        let chunks = MemCollection::default();
        let db = MemDb;
        let err = ChunkedFile::open(&files, &chunks, &db, "f", "a+", OpenOptions::default()).unwrap_err();
        assert!(matches!(err, Error::GridError(_)));
    }
}
