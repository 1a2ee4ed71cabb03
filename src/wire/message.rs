//! Message assembly and response parsing.

use crate::codec::{self, Document};
use crate::error::{Error, Result};
use crate::net::socket;
use crate::wire::header::{Header, ResponseHeader, HEADER_SIZE, RESPONSE_HEADER_SIZE};
use byteorder::{LittleEndian, ReadBytesExt};
use std::net::TcpStream;

/// A logical `(opcode, request_id, body_bytes)` triple, framed with its
/// standard header on [`Message::encode`].
pub struct Message {
    pub opcode: i32,
    pub request_id: u32,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(opcode: i32, request_id: u32, body: Vec<u8>) -> Self {
        Message {
            opcode,
            request_id,
            body,
        }
    }

    /// Prepend the 16-byte standard header to the body, producing the
    /// full bytes to send on the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = Header {
            total_length: (HEADER_SIZE + self.body.len()) as i32,
            request_id: self.request_id,
            response_to: 0,
            opcode: self.opcode,
        };
        let mut buf = Vec::with_capacity(header.total_length as usize);
        header
            .write_to(&mut buf)
            .map_err(|e| Error::ArgumentError(format!("encoding header: {e}")))?;
        buf.extend_from_slice(&self.body);
        Ok(buf)
    }
}

/// Build an `OP_QUERY` body: `i32 flags; cstring full_collection_name;
/// i32 number_to_skip; i32 number_to_return; document query`.
pub fn build_query_body(
    full_collection_name: &str,
    flags: i32,
    number_to_skip: i32,
    number_to_return: i32,
    query: &Document,
) -> Result<Vec<u8>> {
    use byteorder::WriteBytesExt;

    let mut body = Vec::new();
    body.write_i32::<LittleEndian>(flags)
        .map_err(|e| Error::ArgumentError(e.to_string()))?;
    body.extend_from_slice(full_collection_name.as_bytes());
    body.push(0); // cstring nul terminator
    body.write_i32::<LittleEndian>(number_to_skip)
        .map_err(|e| Error::ArgumentError(e.to_string()))?;
    body.write_i32::<LittleEndian>(number_to_return)
        .map_err(|e| Error::ArgumentError(e.to_string()))?;
    body.extend_from_slice(&codec::serialize(query)?);
    Ok(body)
}

/// A decoded reply: the response header plus its batch of documents.
pub struct Reply {
    pub header: Header,
    pub response_header: ResponseHeader,
    pub documents: Vec<Document>,
}

/// Read one full reply from `stream`: 16-byte header, 20-byte response
/// header, then `number_returned` length-prefixed BSON documents.
pub fn read_reply(stream: &mut TcpStream) -> Result<Reply> {
    let header_bytes = socket::recv_exact(stream, HEADER_SIZE)?;
    let header = Header::read_from(&mut &header_bytes[..])
        .map_err(|e| Error::ConnectionFailure(format!("short read of header: {e}")))?;

    let response_header_bytes = socket::recv_exact(stream, RESPONSE_HEADER_SIZE)?;
    let response_header = ResponseHeader::read_from(&mut &response_header_bytes[..])
        .map_err(|e| Error::ConnectionFailure(format!("short read of response header: {e}")))?;

    let mut documents = Vec::with_capacity(response_header.number_returned.max(0) as usize);
    for _ in 0..response_header.number_returned {
        let len_bytes = socket::recv_exact(stream, 4)?;
        let doc_len = (&len_bytes[..])
            .read_i32::<LittleEndian>()
            .map_err(|e| Error::ConnectionFailure(format!("short read of doc length: {e}")))?;
        if doc_len < 4 {
            return Err(Error::ConnectionFailure(format!(
                "invalid document length {doc_len}"
            )));
        }
        let rest = socket::recv_exact(stream, (doc_len - 4) as usize)?;
        let mut full = len_bytes;
        full.extend_from_slice(&rest);
        documents.push(codec::deserialize(&full)?);
    }

    Ok(Reply {
        header,
        response_header,
        documents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::header::OpCode;
    use bson::doc;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn encode_prepends_correct_header() {
        let msg = Message::new(OpCode::Query as i32, 9, vec![1, 2, 3]);
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 3);
        let header = Header::read_from(&mut &bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(header.total_length, (HEADER_SIZE + 3) as i32);
        assert_eq!(header.request_id, 9);
        assert_eq!(header.response_to, 0);
        assert_eq!(header.opcode, OpCode::Query as i32);
    }

    #[test]
    fn read_reply_decodes_documents() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let doc1 = doc! { "ok": 1 };
            let doc1_bytes = codec::serialize(&doc1).unwrap();

            let response_header = ResponseHeader {
                flags: 0,
                cursor_id: 0,
                starting_from: 0,
                number_returned: 1,
            };
            let mut body = Vec::new();
            body.extend_from_slice(&response_header.flags.to_le_bytes());
            body.extend_from_slice(&response_header.cursor_id.to_le_bytes());
            body.extend_from_slice(&response_header.starting_from.to_le_bytes());
            body.extend_from_slice(&response_header.number_returned.to_le_bytes());
            body.extend_from_slice(&doc1_bytes);

            let header = Header {
                total_length: (HEADER_SIZE + body.len()) as i32,
                request_id: 1,
                response_to: 9,
                opcode: OpCode::Reply as i32,
            };
            let mut full = Vec::new();
            header.write_to(&mut full).unwrap();
            full.extend_from_slice(&body);
            std::io::Write::write_all(&mut sock, &full).unwrap();
        });

        let mut client = socket::connect(
            &addr.ip().to_string(),
            addr.port(),
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        let reply = read_reply(&mut client).unwrap();
        assert_eq!(reply.response_header.number_returned, 1);
        assert_eq!(reply.documents.len(), 1);
        assert_eq!(reply.documents[0].get_i32("ok").unwrap(), 1);

        server.join().unwrap();
    }
}
