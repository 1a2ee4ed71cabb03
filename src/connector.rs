//! Server discovery among paired endpoints and master election.

use crate::auth::Authenticator;
use crate::codec::{self, Document};
use crate::config::{Endpoint, NodeSet, SavedAuthList};
use crate::error::{Error, Result};
use crate::net::socket;
use crate::wire::{self, OpCode};
use bson::doc;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a successful connector run: the selected endpoint and
/// whether it was accepted as a slave (only possible for a single node
/// with `slave_ok` set).
pub struct Elected {
    pub endpoint: Endpoint,
}

/// Probe every endpoint in order, select a master (or accept a slave
/// under explicit `slave_ok` consent), and replay saved authentications
/// against the winner before returning.
pub fn connect(
    nodes: &NodeSet,
    slave_ok: bool,
    saved_auths: &SavedAuthList,
    authenticator: &dyn Authenticator,
    request_id: &AtomicU32,
) -> Result<Elected> {
    // slave_ok only makes sense for a single node; a paired connection
    // silently forces it off.
    let effective_slave_ok = slave_ok && !nodes.is_paired();

    for endpoint in nodes.iter() {
        match probe(endpoint, request_id) {
            Ok(reply) => {
                let ok = reply.get_f64("ok").map(|v| v == 1.0).unwrap_or(false)
                    || reply.get_i32("ok").map(|v| v == 1).unwrap_or(false);
                let is_master = reply
                    .get_bool("ismaster")
                    .unwrap_or_else(|_| reply.get_i32("ismaster").map(|v| v != 0).unwrap_or(false));

                if ok && is_master {
                    debug!(host = %endpoint.host, port = endpoint.port, "connector: elected master");
                    replay_auths(endpoint, saved_auths, authenticator, request_id)?;
                    return Ok(Elected {
                        endpoint: endpoint.clone(),
                    });
                }

                if ok && !is_master && nodes.len() == 1 {
                    if effective_slave_ok {
                        debug!(host = %endpoint.host, port = endpoint.port, "connector: accepted slave");
                        replay_auths(endpoint, saved_auths, authenticator, request_id)?;
                        return Ok(Elected {
                            endpoint: endpoint.clone(),
                        });
                    }
                    return Err(Error::ConfigurationError(
                        "trying to connect directly to slave".to_string(),
                    ));
                }
                // ok && !is_master but paired: keep probing remaining endpoints.
            }
            Err(e) => {
                warn!(host = %endpoint.host, port = endpoint.port, error = %e, "connector: probe failed");
                continue;
            }
        }
    }

    Err(Error::ConnectionFailure(
        "no endpoint accepted as master or slave".to_string(),
    ))
}

/// Open a direct TCP socket to `endpoint`, issue `ismaster`, and return
/// the raw reply document. Response checking is deliberately skipped:
/// `ok == 0` is interpreted by the caller like any other field, not as a
/// safe-check failure.
fn probe(endpoint: &Endpoint, request_id: &AtomicU32) -> Result<Document> {
    let mut stream = socket::connect(&endpoint.host, endpoint.port, PROBE_TIMEOUT)?;
    let reply = issue_admin_command(&mut stream, "admin", &doc! { "ismaster": 1 }, request_id)?;
    // The probe socket is discarded; the pool opens its own sockets to
    // the selected master.
    drop(stream);
    Ok(reply)
}

/// Issue a single admin command directly on `stream` and return the
/// first document in the reply.
pub fn issue_admin_command(
    stream: &mut TcpStream,
    db_name: &str,
    command: &Document,
    request_id: &AtomicU32,
) -> Result<Document> {
    let id = request_id.fetch_add(1, Ordering::SeqCst);
    let collection = format!("{db_name}.$cmd");
    let body = wire::message::build_query_body(&collection, 0, 0, -1, command)?;
    let message = wire::Message::new(OpCode::Query as i32, id, body);
    socket::send_all(stream, &message.encode()?)?;

    let reply = wire::read_reply(stream)?;
    reply
        .documents
        .into_iter()
        .next()
        .ok_or_else(|| Error::ConnectionFailure("empty admin command reply".to_string()))
}

fn replay_auths(
    endpoint: &Endpoint,
    saved_auths: &SavedAuthList,
    authenticator: &dyn Authenticator,
    _request_id: &AtomicU32,
) -> Result<()> {
    if saved_auths.iter().next().is_none() {
        return Ok(());
    }
    let mut stream = socket::connect(&endpoint.host, endpoint.port, PROBE_TIMEOUT)?;
    for auth in saved_auths.iter() {
        authenticator.authenticate(&mut stream, auth)?;
    }
    Ok(())
}
