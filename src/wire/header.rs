//! The 16-byte standard header and 20-byte response header.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Size in bytes of the standard message header.
pub const HEADER_SIZE: usize = 16;
/// Size in bytes of the OP_REPLY response header that follows the
/// standard header on query/command replies.
pub const RESPONSE_HEADER_SIZE: usize = 20;

/// Wire opcodes this core sends or recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OpCode {
    Reply = 1,
    Update = 2001,
    Insert = 2002,
    Query = 2004,
    GetMore = 2005,
    Delete = 2006,
    KillCursors = 2007,
    Msg = 1000,
}

impl OpCode {
    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            1 => OpCode::Reply,
            1000 => OpCode::Msg,
            2001 => OpCode::Update,
            2002 => OpCode::Insert,
            2004 => OpCode::Query,
            2005 => OpCode::GetMore,
            2006 => OpCode::Delete,
            2007 => OpCode::KillCursors,
            _ => return None,
        })
    }
}

/// `i32 total_length; i32 request_id; i32 response_to; i32 opcode`, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub total_length: i32,
    pub request_id: u32,
    pub response_to: u32,
    pub opcode: i32,
}

impl Header {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.total_length)?;
        w.write_u32::<LittleEndian>(self.request_id)?;
        w.write_u32::<LittleEndian>(self.response_to)?;
        w.write_i32::<LittleEndian>(self.opcode)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Header {
            total_length: r.read_i32::<LittleEndian>()?,
            request_id: r.read_u32::<LittleEndian>()?,
            response_to: r.read_u32::<LittleEndian>()?,
            opcode: r.read_i32::<LittleEndian>()?,
        })
    }
}

/// `i32 flags; i64 cursor_id; i32 starting_from; i32 number_returned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub flags: i32,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub number_returned: i32,
}

impl ResponseHeader {
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(ResponseHeader {
            flags: r.read_i32::<LittleEndian>()?,
            cursor_id: r.read_i64::<LittleEndian>()?,
            starting_from: r.read_i32::<LittleEndian>()?,
            number_returned: r.read_i32::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = Header {
            total_length: 42,
            request_id: 7,
            response_to: 0,
            opcode: OpCode::Query as i32,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let decoded = Header::read_from(&mut &buf[..]).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn opcode_round_trips() {
        assert_eq!(OpCode::from_i32(2004), Some(OpCode::Query));
        assert_eq!(OpCode::from_i32(9999), None);
    }
}
