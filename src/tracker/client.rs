//! Thin tracker client: REGISTER (with retry) and GETPEERS. Any transport
//! or protocol failure is swallowed per spec.md §7 — `register` returns
//! `false`, `get_peers` returns an empty list, indistinguishable from "no
//! peers".

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use super::protocol::{parse_peer_list, PeerEndpoint};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// A single REGISTER attempt. Returns `true` iff the tracker answered
/// `OK`.
pub fn register(tracker: impl std::net::ToSocketAddrs, name: &str, endpoint: &PeerEndpoint) -> bool {
    (|| -> std::io::Result<bool> {
        let mut stream = TcpStream::connect(tracker)?;
        let line = format!("REGISTER {name} {} {}\n", endpoint.host, endpoint.port);
        stream.write_all(line.as_bytes())?;
        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader.read_line(&mut response)?;
        Ok(response.trim_end_matches(['\n', '\r']) == "OK")
    })()
    .unwrap_or_else(|e| {
        debug!("register({name}) failed: {e}");
        false
    })
}

/// Wraps `register` in up to `RETRY_ATTEMPTS` attempts with a 1-second
/// sleep between them.
pub fn register_with_retry(
    tracker_ip: &str,
    tracker_port: u16,
    name: &str,
    endpoint: &PeerEndpoint,
) -> bool {
    let tracker = format!("{tracker_ip}:{tracker_port}");
    for attempt in 0..RETRY_ATTEMPTS {
        if register(&tracker, name, endpoint) {
            return true;
        }
        if attempt + 1 < RETRY_ATTEMPTS {
            thread::sleep(RETRY_DELAY);
        }
    }
    warn!("giving up registering {name} after {RETRY_ATTEMPTS} attempts");
    false
}

/// Returns the peer endpoints advertising `name`, or an empty list on any
/// failure.
pub fn get_peers(tracker: impl std::net::ToSocketAddrs, name: &str) -> Vec<PeerEndpoint> {
    (|| -> std::io::Result<Vec<PeerEndpoint>> {
        let mut stream = TcpStream::connect(tracker)?;
        let line = format!("GETPEERS {name}\n");
        stream.write_all(line.as_bytes())?;
        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader.read_line(&mut response)?;
        let body = response.trim_end_matches(['\n', '\r']);
        Ok(parse_peer_list(body))
    })()
    .unwrap_or_else(|e| {
        debug!("get_peers({name}) failed: {e}");
        Vec::new()
    })
}
