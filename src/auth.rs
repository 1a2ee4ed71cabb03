//! Authentication replay collaborator.
//!
//! Credential hashing and the wire-level authentication handshake are the
//! database façade's job, not this crate's; we only need a seam to call
//! into it when saved auths must be replayed after a master (re)connect.

use crate::config::SavedAuth;
use crate::error::Result;
use std::net::TcpStream;

/// Replays a single saved authentication against a connected socket.
///
/// Implementations raise [`crate::error::Error::AuthenticationError`] on
/// failure; this crate does not interpret the wire-level auth handshake
/// itself.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, socket: &mut TcpStream, auth: &SavedAuth) -> Result<()>;
}

/// An authenticator that accepts everything without touching the socket,
/// for connections that never configured saved auths or for tests.
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn authenticate(&self, _socket: &mut TcpStream, _auth: &SavedAuth) -> Result<()> {
        Ok(())
    }
}
