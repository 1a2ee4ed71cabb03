//! Length-complete send/receive over a single TCP stream.
//!
//! Any failure here is fatal to the whole connection: the caller is
//! expected to tear down every pooled socket and reconnect from scratch.

use crate::error::{Error, Result};
use socket2::{SockRef, TcpKeepalive};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Open a TCP stream to `host:port` with `TCP_NODELAY` set.
pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    use std::net::ToSocketAddrs;

    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::ConnectionFailure(format!("resolving {host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| Error::ConnectionFailure(format!("no address for {host}:{port}")))?;

    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| Error::ConnectionFailure(format!("connecting to {host}:{port}: {e}")))?;
    stream.set_nodelay(true)?;

    let sock_ref = SockRef::from(&stream);
    let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(120));
    let _ = sock_ref.set_tcp_keepalive(&keepalive);

    Ok(stream)
}

/// Write `bytes` in full or fail the connection.
pub fn send_all(stream: &mut TcpStream, bytes: &[u8]) -> Result<()> {
    stream
        .write_all(bytes)
        .map_err(|e| Error::ConnectionFailure(format!("send failed: {e}")))?;
    Ok(())
}

/// Read exactly `n` bytes, looping over short reads.
///
/// A zero-length read before `n` bytes have accumulated means the peer
/// closed the connection.
pub fn recv_exact(stream: &mut TcpStream, n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        let read = stream
            .read(&mut buf[filled..])
            .map_err(|e| Error::ConnectionFailure(format!("recv failed: {e}")))?;
        if read == 0 {
            return Err(Error::ConnectionFailure(
                "connection closed by peer".to_string(),
            ));
        }
        filled += read;
    }
    Ok(buf)
}
