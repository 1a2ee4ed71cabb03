//! `send`, `send_with_safe_check`, `receive`: the operations higher
//! layers use to talk to the server, with request ids attached and
//! safe-mode round trips serialized.

use crate::codec::Document;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::wire::{self, OpCode, Reply};
use bson::doc;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Recognized `getLastError` options; anything else is an `ArgumentError`.
const SAFE_OPT_KEYS: [&str; 3] = ["w", "wtimeout", "fsync"];

/// Everything the router needs to do its job, borrowed from the owning
/// connection for the duration of one call.
pub struct RouterContext<'a> {
    pub pool: &'a Pool,
    /// Serializes the send-then-receive pair so replies from concurrent
    /// callers cannot be interleaved on a given socket.
    pub wire_lock: &'a Mutex<()>,
    pub request_id: &'a AtomicU32,
    pub connect: &'a (dyn Fn() -> Result<TcpStream> + Send + Sync),
    pub log: bool,
}

impl<'a> RouterContext<'a> {
    fn next_request_id(&self) -> u32 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    fn log_send(&self, message: &str) {
        if self.log {
            debug!(target: "docdb_client::mongodb", "  MONGODB {message}");
        }
    }

    /// Fire-and-forget: checkout, pack, send, checkin. No reply read.
    pub fn send(&self, opcode: OpCode, body: Vec<u8>, log_message: Option<&str>) -> Result<()> {
        self.log_send(log_message.unwrap_or(&body_log(&body)));
        let id = self.next_request_id();
        let message = wire::Message::new(opcode as i32, id, body);
        let bytes = message.encode()?;

        let mut checked_out = self.pool.checkout(self.connect)?;
        let result = crate::net::socket::send_all(&mut checked_out.stream, &bytes);
        match result {
            Ok(()) => {
                self.pool.checkin(checked_out);
                Ok(())
            }
            Err(e) => {
                self.pool.teardown();
                Err(e)
            }
        }
    }

    /// Query/command with a reply, on an existing socket when given,
    /// otherwise a freshly checked-out one.
    pub fn receive(
        &self,
        opcode: OpCode,
        body: Vec<u8>,
        log_message: Option<&str>,
        socket: Option<&mut TcpStream>,
    ) -> Result<Reply> {
        self.log_send(log_message.unwrap_or(&body_log(&body)));
        let id = self.next_request_id();
        let message = wire::Message::new(opcode as i32, id, body);
        let bytes = message.encode()?;

        if let Some(stream) = socket {
            let _wire_guard = self.wire_lock.lock().expect("wire mutex poisoned");
            return send_and_read(stream, &bytes).map_err(|e| {
                // Caller owns this socket's lifecycle; we only report.
                e
            });
        }

        // Pool before wire, per the request-id -> pool -> wire acquisition
        // order: a caller waiting on a socket must not hold the wire lock.
        let mut checked_out = self.pool.checkout(self.connect)?;
        let _wire_guard = self.wire_lock.lock().expect("wire mutex poisoned");
        let result = send_and_read(&mut checked_out.stream, &bytes);
        match result {
            Ok(reply) => {
                self.pool.checkin(checked_out);
                Ok(reply)
            }
            Err(e) => {
                self.pool.teardown();
                Err(e)
            }
        }
    }

    /// Write with synchronous acknowledgement: appends `getLastError` to
    /// the same socket write and reads a single response, raising
    /// `OperationFailure` on a non-null `err`/`errmsg`.
    pub fn send_with_safe_check(
        &self,
        opcode: OpCode,
        body: Vec<u8>,
        db_name: &str,
        safe_opts: &Document,
        log_message: Option<&str>,
    ) -> Result<(Vec<Document>, i32, i64)> {
        for key in safe_opts.keys() {
            if !SAFE_OPT_KEYS.contains(&key.as_str()) {
                return Err(Error::ArgumentError(format!(
                    "unrecognized safe option '{key}'"
                )));
            }
        }

        self.log_send(log_message.unwrap_or(&body_log(&body)));
        let write_id = self.next_request_id();
        let write_message = wire::Message::new(opcode as i32, write_id, body);
        let mut bytes = write_message.encode()?;

        let mut gle_doc = doc! { "getlasterror": 1 };
        for (k, v) in safe_opts.iter() {
            gle_doc.insert(k.clone(), v.clone());
        }
        let gle_id = self.next_request_id();
        let gle_body = wire::message::build_query_body(
            &format!("{db_name}.$cmd"),
            0,
            0,
            -1,
            &gle_doc,
        )?;
        let gle_message = wire::Message::new(OpCode::Query as i32, gle_id, gle_body);
        bytes.extend_from_slice(&gle_message.encode()?);

        // Pool before wire, per the request-id -> pool -> wire acquisition
        // order: a caller waiting on a socket must not hold the wire lock.
        let mut checked_out = self.pool.checkout(self.connect)?;
        let _wire_guard = self.wire_lock.lock().expect("wire mutex poisoned");
        let result = send_and_read(&mut checked_out.stream, &bytes);

        let reply = match result {
            Ok(reply) => {
                self.pool.checkin(checked_out);
                reply
            }
            Err(e) => {
                self.pool.teardown();
                return Err(e);
            }
        };

        if let Some(first) = reply.documents.first() {
            if let Some(err_text) = extract_error(first) {
                return Err(Error::OperationFailure(err_text));
            }
        }

        Ok((
            reply.documents,
            reply.response_header.number_returned,
            reply.response_header.cursor_id,
        ))
    }
}

/// Render a message body for the debug log when the caller didn't supply
/// a human-readable `log_message`: a hex dump, truncated for long bodies.
fn body_log(body: &[u8]) -> String {
    const MAX: usize = 200;
    let shown = &body[..body.len().min(MAX)];
    let hex: String = shown.iter().map(|b| format!("{b:02x}")).collect();
    if body.len() > MAX {
        format!("{hex}... ({} bytes)", body.len())
    } else {
        hex
    }
}

fn send_and_read(stream: &mut TcpStream, bytes: &[u8]) -> Result<Reply> {
    crate::net::socket::send_all(stream, bytes)?;
    wire::read_reply(stream)
}

fn extract_error(doc: &Document) -> Option<String> {
    if let Ok(err) = doc.get_str("err") {
        if !err.is_empty() {
            return Some(err.to_string());
        }
    }
    if let Ok(errmsg) = doc.get_str("errmsg") {
        if !errmsg.is_empty() {
            return Some(errmsg.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::wire::header::{Header, ResponseHeader, HEADER_SIZE};
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn rejects_unrecognized_safe_opts() {
        let pool = Pool::new(1, Duration::from_secs(1));
        let wire_lock = Mutex::new(());
        let request_id = AtomicU32::new(0);
        let connect: Box<dyn Fn() -> Result<TcpStream> + Send + Sync> =
            Box::new(|| Err(Error::ConnectionFailure("unused".to_string())));

        let ctx = RouterContext {
            pool: &pool,
            wire_lock: &wire_lock,
            request_id: &request_id,
            connect: connect.as_ref(),
            log: false,
        };

        let err = ctx
            .send_with_safe_check(
                OpCode::Update,
                vec![],
                "test",
                &doc! { "bogus": 1 },
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ArgumentError(_)));
    }

    #[test]
    fn safe_check_surfaces_operation_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            if let Ok((mut sock, _)) = listener.accept() {
                // Drain the update + getlasterror messages without
                // decoding them; the fake only cares about the reply it
                // sends back.
                loop {
                    let header_bytes = match crate::net::socket::recv_exact(&mut sock, HEADER_SIZE)
                    {
                        Ok(b) => b,
                        Err(_) => break,
                    };
                    let header = Header::read_from(&mut &header_bytes[..]).unwrap();
                    let body_len = header.total_length as usize - HEADER_SIZE;
                    let _ = crate::net::socket::recv_exact(&mut sock, body_len).unwrap();

                    if header.opcode == OpCode::Query as i32 {
                        let reply_doc = doc! { "err": "duplicate key", "ok": 1 };
                        let reply_bytes = codec::serialize(&reply_doc).unwrap();
                        let response_header = ResponseHeader {
                            flags: 0,
                            cursor_id: 0,
                            starting_from: 0,
                            number_returned: 1,
                        };
                        let mut resp_body = Vec::new();
                        resp_body.extend_from_slice(&response_header.flags.to_le_bytes());
                        resp_body.extend_from_slice(&response_header.cursor_id.to_le_bytes());
                        resp_body
                            .extend_from_slice(&response_header.starting_from.to_le_bytes());
                        resp_body
                            .extend_from_slice(&response_header.number_returned.to_le_bytes());
                        resp_body.extend_from_slice(&reply_bytes);

                        let out_header = Header {
                            total_length: (HEADER_SIZE + resp_body.len()) as i32,
                            request_id: 99,
                            response_to: header.request_id,
                            opcode: OpCode::Reply as i32,
                        };
                        let mut full = Vec::new();
                        out_header.write_to(&mut full).unwrap();
                        full.extend_from_slice(&resp_body);
                        std::io::Write::write_all(&mut sock, &full).unwrap();
                        break;
                    }
                }
            }
        });

        let pool = Pool::new(1, Duration::from_secs(1));
        let wire_lock = Mutex::new(());
        let request_id = AtomicU32::new(0);
        let connect: Box<dyn Fn() -> Result<TcpStream> + Send + Sync> = Box::new(move || {
            crate::net::socket::connect(&addr.ip().to_string(), addr.port(), Duration::from_secs(1))
        });

        let ctx = RouterContext {
            pool: &pool,
            wire_lock: &wire_lock,
            request_id: &request_id,
            connect: connect.as_ref(),
            log: false,
        };

        let err = ctx
            .send_with_safe_check(OpCode::Update, vec![1, 2, 3], "test", &doc! {}, None)
            .unwrap_err();
        assert!(matches!(err, Error::OperationFailure(msg) if msg == "duplicate key"));
        // The socket was checked back in, not discarded.
        assert_eq!(pool.sockets_len(), 1);
    }
}
