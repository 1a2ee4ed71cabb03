//! Top-level connection: wires the pool, connector, and request router
//! together behind the construction surface from spec §6.

use crate::auth::{Authenticator, NoAuth};
use crate::codec::Document;
use crate::config::{Endpoint, NodeSet, SavedAuth, SavedAuthList};
use crate::connector;
use crate::error::{Error, Result};
use crate::net::socket;
use crate::pool::{Pool, DEFAULT_POOL_SIZE, DEFAULT_TIMEOUT_SECONDS};
use crate::router::RouterContext;
use crate::wire::OpCode;
use std::sync::atomic::AtomicU32;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// Options accepted by `open`/`open_paired`/`open_from_uri`.
pub struct Options {
    pub pool_size: usize,
    pub timeout: Duration,
    pub slave_ok: bool,
    pub connect: bool,
    pub log: bool,
    pub authenticator: Box<dyn Authenticator>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            pool_size: DEFAULT_POOL_SIZE,
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECONDS),
            slave_ok: false,
            connect: true,
            log: false,
            authenticator: Box::new(NoAuth),
        }
    }
}

pub struct Connection {
    nodes: NodeSet,
    slave_ok: bool,
    pool: Pool,
    wire_lock: Mutex<()>,
    request_id: AtomicU32,
    master: Mutex<Option<Endpoint>>,
    saved_auths: Mutex<SavedAuthList>,
    authenticator: Box<dyn Authenticator>,
    log: bool,
    timeout: Duration,
}

impl Connection {
    fn new(nodes: NodeSet, options: Options) -> Self {
        Connection {
            nodes,
            slave_ok: options.slave_ok,
            pool: Pool::new(options.pool_size, options.timeout),
            wire_lock: Mutex::new(()),
            request_id: AtomicU32::new(0),
            master: Mutex::new(None),
            saved_auths: Mutex::new(SavedAuthList::new()),
            authenticator: options.authenticator,
            log: options.log,
            timeout: options.timeout,
        }
    }

    /// Open a connection to a single endpoint.
    pub fn open(host: Option<&str>, port: Option<u16>, options: Options) -> Result<Self> {
        let endpoint = Endpoint::new(
            host.unwrap_or(crate::config::DEFAULT_HOST),
            port.unwrap_or(crate::config::DEFAULT_PORT),
        );
        let eager_connect = options.connect;
        let conn = Connection::new(NodeSet::single(endpoint), options);
        if eager_connect {
            conn.ensure_connected()?;
        }
        Ok(conn)
    }

    /// Open a connection to a two-node pair.
    pub fn open_paired(
        tuples: Vec<(Option<String>, Option<u16>)>,
        options: Options,
    ) -> Result<Self> {
        let nodes = crate::config::uri::parse_pair(tuples)?;
        let eager_connect = options.connect;
        let conn = Connection::new(nodes, options);
        if eager_connect {
            conn.ensure_connected()?;
        }
        Ok(conn)
    }

    /// Open a connection from a `mongodb://` URI, seeding saved auths
    /// from any embedded credentials.
    pub fn open_from_uri(uri: &str, options: Options) -> Result<Self> {
        let parsed = crate::config::uri::parse(uri)?;
        let auths = crate::config::uri::apply_auth(&parsed.nodes, &parsed.auth);
        let eager_connect = options.connect;
        let conn = Connection::new(parsed.nodes, options);
        {
            let mut saved = conn.saved_auths.lock().expect("saved auths mutex poisoned");
            for auth in auths {
                saved.add(auth);
            }
        }
        if eager_connect {
            conn.ensure_connected()?;
        }
        Ok(conn)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.master.lock().expect("master mutex poisoned").is_some() {
            return Ok(());
        }
        let saved_auths = self.saved_auths.lock().expect("saved auths mutex poisoned");
        let elected = connector::connect(
            &self.nodes,
            self.slave_ok,
            &saved_auths,
            self.authenticator.as_ref(),
            &self.request_id,
        )?;
        drop(saved_auths);
        info!(host = %elected.endpoint.host, port = elected.endpoint.port, "connected");
        *self.master.lock().expect("master mutex poisoned") = Some(elected.endpoint);
        Ok(())
    }

    fn new_master_socket(&self) -> Result<std::net::TcpStream> {
        let master = self
            .master
            .lock()
            .expect("master mutex poisoned")
            .clone()
            .ok_or_else(|| Error::ConnectionFailure("not connected".to_string()))?;
        socket::connect(&master.host, master.port, self.timeout)
    }

    /// Build a [`RouterContext`] borrowing this connection's pool, wire
    /// lock, and request-id counter, plus a `connect` closure bound to
    /// `connect_slot` — a local the caller owns for the duration of the
    /// router call, so the context never outlives what it borrows.
    fn router<'a>(&'a self, connect_slot: &'a (dyn Fn() -> Result<std::net::TcpStream> + Send + Sync)) -> RouterContext<'a> {
        RouterContext {
            pool: &self.pool,
            wire_lock: &self.wire_lock,
            request_id: &self.request_id,
            connect: connect_slot,
            log: self.log,
        }
    }

    /// Fire-and-forget write.
    pub fn send(&self, opcode: OpCode, body: Vec<u8>, log_message: Option<&str>) -> Result<()> {
        self.ensure_connected()?;
        let connect = || self.new_master_socket();
        let router = self.router(&connect);
        router.send(opcode, body, log_message)
    }

    /// Write with synchronous `getLastError` acknowledgement.
    pub fn send_with_safe_check(
        &self,
        opcode: OpCode,
        body: Vec<u8>,
        db_name: &str,
        safe_opts: &Document,
        log_message: Option<&str>,
    ) -> Result<(Vec<Document>, i32, i64)> {
        self.ensure_connected()?;
        let connect = || self.new_master_socket();
        let router = self.router(&connect);
        router.send_with_safe_check(opcode, body, db_name, safe_opts, log_message)
    }

    /// Query/command with a reply.
    pub fn receive(
        &self,
        opcode: OpCode,
        body: Vec<u8>,
        log_message: Option<&str>,
    ) -> Result<crate::wire::Reply> {
        self.ensure_connected()?;
        let connect = || self.new_master_socket();
        let router = self.router(&connect);
        router.receive(opcode, body, log_message, None)
    }

    pub fn add_auth(&self, db_name: &str, username: &str, password: &str) {
        self.saved_auths
            .lock()
            .expect("saved auths mutex poisoned")
            .add(SavedAuth {
                db_name: db_name.to_string(),
                username: username.to_string(),
                password: password.to_string(),
            });
    }

    pub fn remove_auth(&self, db_name: &str) {
        self.saved_auths
            .lock()
            .expect("saved auths mutex poisoned")
            .remove(db_name);
    }

    pub fn clear_auths(&self) {
        self.saved_auths
            .lock()
            .expect("saved auths mutex poisoned")
            .clear();
    }

    /// Current master endpoint, if connected.
    pub fn host_port(&self) -> Option<(String, u16)> {
        self.master
            .lock()
            .expect("master mutex poisoned")
            .as_ref()
            .map(|e| (e.host.clone(), e.port))
    }

    pub fn pooled_sockets(&self) -> usize {
        self.pool.sockets_len()
    }

    /// Tear down every pooled socket and clear the current master; the
    /// next operation re-enters the connector.
    pub fn close(&self) {
        self.pool.teardown();
        *self.master.lock().expect("master mutex poisoned") = None;
    }
}
