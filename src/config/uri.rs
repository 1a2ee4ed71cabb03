//! `mongodb://` URI parsing, per the grammar in spec §6.
//!
//! `mongodb://[user:pass@]host1[:port1][,host2[:port2]...][/db]`
//!
//! Each comma-separated spec is matched individually against
//! `(([.\w]+):([\w]+)@)?([.\w]+)(:([\w]+))?(/([-\w]+))?`; credentials and
//! the database name may land on different specs (the credentials
//! typically precede the first host, the database name typically follows
//! the last), so the `{user, pass, db}`-all-or-nothing rule is checked
//! across the aggregate of every spec in the URI, not per spec.

use crate::config::endpoint::{Endpoint, NodeSet, SavedAuth};
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

const SCHEME_PREFIX: &str = "mongodb://";

fn spec_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:([.\w]+):([\w]+)@)?([.\w]+)(?::([\w]+))?(?:/([-\w]+))?$")
            .expect("static URI spec regex is valid")
    })
}

/// The parsed result of a `mongodb://` URI: a node set plus, when
/// credentials and a database were both present somewhere in the URI,
/// one saved auth to apply per host entry.
pub struct ParsedUri {
    pub nodes: NodeSet,
    pub auth: Option<(String, String, String)>, // (db, user, pass)
}

pub fn parse(uri: &str) -> Result<ParsedUri> {
    let rest = uri.strip_prefix(SCHEME_PREFIX).ok_or_else(|| {
        Error::ArgumentError(format!("uri must start with '{SCHEME_PREFIX}'"))
    })?;
    if rest.is_empty() {
        return Err(Error::ArgumentError("uri has no host list".to_string()));
    }

    let re = spec_regex();
    let mut endpoints = Vec::new();
    let mut user: Option<String> = None;
    let mut pass: Option<String> = None;
    let mut db: Option<String> = None;

    for raw_spec in rest.split(',') {
        let caps = re
            .captures(raw_spec)
            .ok_or_else(|| Error::ArgumentError(format!("malformed uri spec '{raw_spec}'")))?;

        if let Some(u) = caps.get(1) {
            user = Some(u.as_str().to_string());
        }
        if let Some(p) = caps.get(2) {
            pass = Some(p.as_str().to_string());
        }
        let host = caps
            .get(3)
            .ok_or_else(|| Error::ArgumentError(format!("missing host in '{raw_spec}'")))?
            .as_str()
            .to_string();
        let port = match caps.get(4) {
            Some(p) => parse_port(p.as_str())?,
            None => Endpoint::default_endpoint().port,
        };
        if let Some(d) = caps.get(5) {
            db = Some(d.as_str().to_string());
        }

        endpoints.push(Endpoint::new(host, port));
    }

    let any_present = user.is_some() || pass.is_some() || db.is_some();
    let all_present = user.is_some() && pass.is_some() && db.is_some();
    if any_present && !all_present {
        return Err(Error::ArgumentError(
            "uri must supply user, pass, and db together or not at all".to_string(),
        ));
    }

    let nodes = NodeSet::new(endpoints)?;
    let auth = if all_present {
        Some((db.unwrap(), user.unwrap(), pass.unwrap()))
    } else {
        None
    };

    Ok(ParsedUri { nodes, auth })
}

/// Build the saved-auth entries implied by a parsed URI: the same triple
/// applied once per host entry (the list itself is keyed by `db_name`, so
/// repeated adds for the same database collapse to one entry).
pub fn apply_auth(nodes: &NodeSet, auth: &Option<(String, String, String)>) -> Vec<SavedAuth> {
    let Some((db_name, username, password)) = auth else {
        return Vec::new();
    };
    nodes
        .iter()
        .map(|_| SavedAuth {
            db_name: db_name.clone(),
            username: username.clone(),
            password: password.clone(),
        })
        .collect()
}

fn parse_port(raw: &str) -> Result<u16> {
    if !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::ArgumentError(format!("invalid port '{raw}'")));
    }
    raw.parse::<u16>()
        .map_err(|_| Error::ArgumentError(format!("port out of range '{raw}'")))
}

/// Parse a paired node list: exactly two `[host, port]`-ish tuples.
/// Each tuple may supply `(host, port)`, `(host, None)`, `(None, port)`, or
/// default both. Any arity other than exactly two is an `ArgumentError`.
pub fn parse_pair(tuples: Vec<(Option<String>, Option<u16>)>) -> Result<NodeSet> {
    if tuples.len() != 2 {
        return Err(Error::ArgumentError(format!(
            "paired connections require exactly 2 endpoints, got {}",
            tuples.len()
        )));
    }
    let endpoints = tuples
        .into_iter()
        .map(|(host, port)| {
            Endpoint::new(
                host.unwrap_or_else(|| Endpoint::default_endpoint().host),
                port.unwrap_or_else(|| Endpoint::default_endpoint().port),
            )
        })
        .collect();
    NodeSet::new(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_host_no_auth() {
        let parsed = parse("mongodb://localhost:27017").unwrap();
        assert_eq!(parsed.nodes.len(), 1);
        assert!(parsed.auth.is_none());
    }

    #[test]
    fn parses_paired_hosts_with_credentials_and_db() {
        let parsed = parse("mongodb://u:p@h1:27017,h2:27018/db").unwrap();
        assert_eq!(parsed.nodes.len(), 2);
        let hosts: Vec<_> = parsed.nodes.iter().map(|e| (e.host.clone(), e.port)).collect();
        assert_eq!(hosts, vec![("h1".to_string(), 27017), ("h2".to_string(), 27018)]);
        let (db, user, pass) = parsed.auth.unwrap();
        assert_eq!((db.as_str(), user.as_str(), pass.as_str()), ("db", "u", "p"));

        let auths = apply_auth(&parsed.nodes, &Some(("db".into(), "u".into(), "p".into())));
        assert_eq!(auths.len(), 2);
        assert!(auths.iter().all(|a| a.db_name == "db"));
    }

    #[test]
    fn missing_scheme_is_argument_error() {
        assert!(matches!(parse("h1:27017"), Err(Error::ArgumentError(_))));
    }

    #[test]
    fn invalid_port_is_argument_error() {
        assert!(matches!(
            parse("mongodb://h1:notaport"),
            Err(Error::ArgumentError(_))
        ));
    }

    #[test]
    fn pair_requires_exactly_two() {
        assert!(parse_pair(vec![(Some("a".into()), None)]).is_err());
        assert!(parse_pair(vec![
            (Some("a".into()), None),
            (Some("b".into()), None),
            (Some("c".into()), None)
        ])
        .is_err());
        let nodes = parse_pair(vec![(Some("a".into()), Some(1)), (None, None)]).unwrap();
        assert_eq!(nodes.len(), 2);
    }
}
