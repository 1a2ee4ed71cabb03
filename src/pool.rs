//! Bounded socket pool: check-out/check-in discipline with blocking wait
//! and timeout.
//!
//! `|sockets| <= pool_size` and `checked_out <= sockets` at every instant.
//! Sockets are created lazily against whatever endpoint `connect_fn`
//! resolves to at the moment of creation (the connector keeps that
//! pointed at the current master).

use crate::error::{Error, Result};
use std::net::TcpStream;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_POOL_SIZE: usize = 1;
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 5.0;

/// A socket checked out of the pool. Must be returned via
/// [`Pool::checkin`] on every exit path, success or failure.
pub struct CheckedOut {
    pub stream: TcpStream,
    generation: u64,
}

struct PoolState {
    idle: Vec<TcpStream>,
    checked_out: usize,
    /// Bumped on every teardown so stray check-ins from sockets belonging
    /// to a prior generation are silently dropped instead of re-pooled.
    generation: u64,
}

pub struct Pool {
    state: Mutex<PoolState>,
    cond: Condvar,
    pool_size: usize,
    timeout: Duration,
}

impl Pool {
    pub fn new(pool_size: usize, timeout: Duration) -> Self {
        Pool {
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                checked_out: 0,
                generation: 0,
            }),
            cond: Condvar::new(),
            pool_size: pool_size.max(1),
            timeout,
        }
    }

    /// Check out a socket, opening a fresh one via `connect_fn` if the
    /// pool has not yet reached `pool_size`, else waiting for one to be
    /// checked back in. Fails with [`Error::ConnectionTimeout`] if the
    /// wait exceeds the configured timeout.
    pub fn checkout(&self, connect_fn: impl Fn() -> Result<TcpStream>) -> Result<CheckedOut> {
        let start = Instant::now();
        let mut guard = self.state.lock().expect("pool mutex poisoned");

        loop {
            if let Some(stream) = guard.idle.pop() {
                guard.checked_out += 1;
                debug!(
                    checked_out = guard.checked_out,
                    idle = guard.idle.len(),
                    "checkout: reused idle socket"
                );
                return Ok(CheckedOut {
                    stream,
                    generation: guard.generation,
                });
            }

            let total = guard.idle.len() + guard.checked_out;
            if total < self.pool_size {
                let generation = guard.generation;
                // Connecting can block; release the lock while we dial out
                // so other checkouts/checkins are not starved.
                drop(guard);
                let stream = connect_fn()?;
                guard = self.state.lock().expect("pool mutex poisoned");
                if guard.generation != generation {
                    // Torn down while we were connecting; the freshly
                    // opened socket belongs to a dead generation.
                    drop(stream);
                    continue;
                }
                guard.checked_out += 1;
                debug!(
                    checked_out = guard.checked_out,
                    idle = guard.idle.len(),
                    "checkout: opened new socket"
                );
                return Ok(CheckedOut {
                    stream,
                    generation,
                });
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                debug!(pool_size = self.pool_size, "checkout: timed out");
                return Err(Error::ConnectionTimeout);
            }
            let (g, _timed_out) = self
                .cond
                .wait_timeout(guard, self.timeout - elapsed)
                .expect("pool condvar poisoned");
            guard = g;
            // Loop back to the top: re-check for an idle socket or room
            // to open a new one, and re-evaluate the deadline either way.
        }
    }

    /// Return a socket to the pool. A no-op if the pool has been torn
    /// down since this socket was checked out.
    pub fn checkin(&self, socket: CheckedOut) {
        let mut guard = self.state.lock().expect("pool mutex poisoned");
        guard.checked_out = guard.checked_out.saturating_sub(1);
        if socket.generation == guard.generation {
            guard.idle.push(socket.stream);
        }
        debug!(
            checked_out = guard.checked_out,
            idle = guard.idle.len(),
            "checkin"
        );
        self.cond.notify_one();
    }

    /// Close every pooled socket and bump the generation so outstanding
    /// checkouts cannot be re-pooled. Called on any I/O failure.
    pub fn teardown(&self) {
        let mut guard = self.state.lock().expect("pool mutex poisoned");
        guard.idle.clear();
        guard.checked_out = 0;
        guard.generation += 1;
        debug!(generation = guard.generation, "pool torn down");
        self.cond.notify_all();
    }

    pub fn sockets_len(&self) -> usize {
        let guard = self.state.lock().expect("pool mutex poisoned");
        guard.idle.len() + guard.checked_out
    }

    pub fn checked_out_len(&self) -> usize {
        let guard = self.state.lock().expect("pool mutex poisoned");
        guard.checked_out
    }
}
