//! Core client runtime for a document-oriented database: connection
//! pooling over a binary wire protocol, and a chunked large-object
//! streaming layer built on top of it.
//!
//! BSON encoding, the database/collection façade, credential hashing,
//! and the logger backend are external collaborators; see [`codec`] and
//! [`auth`] for the seams this crate exposes to them.

pub mod auth;
pub mod codec;
pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod gridfs;
pub mod net;
pub mod pool;
pub mod router;
pub mod wire;

pub use connection::{Connection, Options};
pub use error::{Error, Result};
