//! Demo binary: open a connection with CLI flags layered over an
//! optional TOML config file, send an `ismaster` probe, print the reply.

use clap::Parser;
use docdb_client::connection::{Connection, Options};
use docdb_client::wire::OpCode;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "docdb-ping")]
#[command(about = "Probe a document database endpoint with ismaster", long_about = None)]
struct CliArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// `mongodb://` URI to connect to, overrides host/port
    #[arg(long)]
    uri: Option<String>,

    /// Host to connect to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to connect to
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Pool size
    #[arg(long)]
    pool_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    connection: ConnectionConfig,
}

#[derive(Debug, Deserialize, Default)]
struct ConnectionConfig {
    uri: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    pool_size: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();

    let toml_config = if let Some(ref path) = cli.config {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)?
    } else {
        TomlConfig::default()
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let uri = cli.uri.or(toml_config.connection.uri);
    let host = cli.host.or(toml_config.connection.host);
    let port = cli.port.or(toml_config.connection.port);
    let pool_size = cli
        .pool_size
        .or(toml_config.connection.pool_size)
        .unwrap_or(1);

    let options = Options {
        pool_size,
        ..Options::default()
    };

    let conn = if let Some(uri) = uri {
        info!(uri = %uri, "opening connection from uri");
        Connection::open_from_uri(&uri, options)?
    } else {
        info!(host = ?host, port = ?port, "opening connection");
        Connection::open(host.as_deref(), port, options)?
    };

    let body = docdb_client::wire::message::build_query_body(
        "admin.$cmd",
        0,
        0,
        -1,
        &bson::doc! { "ismaster": 1 },
    )?;
    let reply = conn.receive(OpCode::Query, body, Some("ismaster"))?;
    for doc in &reply.documents {
        println!("{doc}");
    }

    conn.close();
    Ok(())
}
