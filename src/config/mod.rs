//! URI/endpoint configuration: node sets, saved auths, and URI parsing.

pub mod endpoint;
pub mod uri;

pub use endpoint::{Endpoint, NodeSet, SavedAuth, SavedAuthList, DEFAULT_HOST, DEFAULT_PORT};
