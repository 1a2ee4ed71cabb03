//! Endpoints, node sets, and saved authentications.

use crate::error::{Error, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 27017;

/// A single `(host, port)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    pub fn default_endpoint() -> Self {
        Endpoint::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::default_endpoint()
    }
}

/// A non-empty ordered sequence of one or two endpoints. A length-2 set
/// is a pair: at most one member is master at any moment.
#[derive(Debug, Clone)]
pub struct NodeSet {
    endpoints: Vec<Endpoint>,
}

impl NodeSet {
    pub fn single(endpoint: Endpoint) -> Self {
        NodeSet {
            endpoints: vec![endpoint],
        }
    }

    /// Build a pair from exactly two endpoints.
    pub fn pair(a: Endpoint, b: Endpoint) -> Self {
        NodeSet {
            endpoints: vec![a, b],
        }
    }

    /// Build from an arbitrary non-empty vec of endpoints of length 1 or 2.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        match endpoints.len() {
            1 | 2 => Ok(NodeSet { endpoints }),
            n => Err(Error::ArgumentError(format!(
                "node set must have 1 or 2 endpoints, got {n}"
            ))),
        }
    }

    pub fn is_paired(&self) -> bool {
        self.endpoints.len() == 2
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A `(db_name, username, password)` triple. The saved-auth list is a set
/// keyed by `db_name`: adding an auth for an existing `db_name` replaces it.
#[derive(Debug, Clone)]
pub struct SavedAuth {
    pub db_name: String,
    pub username: String,
    pub password: String,
}

/// Insertion-ordered set of saved auths, keyed by `db_name`.
#[derive(Debug, Clone, Default)]
pub struct SavedAuthList {
    auths: Vec<SavedAuth>,
}

impl SavedAuthList {
    pub fn new() -> Self {
        SavedAuthList::default()
    }

    /// Add an auth, replacing any existing entry for the same `db_name`
    /// in place so insertion order of the remaining entries is preserved.
    pub fn add(&mut self, auth: SavedAuth) {
        if let Some(existing) = self.auths.iter_mut().find(|a| a.db_name == auth.db_name) {
            *existing = auth;
        } else {
            self.auths.push(auth);
        }
    }

    pub fn remove(&mut self, db_name: &str) {
        self.auths.retain(|a| a.db_name != db_name);
    }

    pub fn clear(&mut self) {
        self.auths.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &SavedAuth> {
        self.auths.iter()
    }
}
