//! Wire framer: standard header, response header, message assembly.

pub mod header;
pub mod message;

pub use header::{OpCode, HEADER_SIZE, RESPONSE_HEADER_SIZE};
pub use message::{read_reply, Message, Reply};
