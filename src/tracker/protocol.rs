//! Wire types and line parsing shared by the tracker server and client.
//!
//! Line-delimited, ASCII, terminated by `\n`:
//!
//! ```text
//! C->T : REGISTER <name> <ip> <port>\n
//! T->C : OK\n
//! C->T : GETPEERS <name>\n
//! T->C : <ip1:port1>;<ip2:port2>;...;<ipN:portN>\n      (may be empty)
//! T->C : ERROR Unknown command\n                        (on bad verb)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// A `(host, port)` pair identifying a peer's data-plane listener, rendered
/// on the wire as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerEndpoint {
    pub host: String,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        PeerEndpoint {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerEndpoint {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ProtocolError::MalformedRequest(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| ProtocolError::MalformedRequest(s.to_string()))?;
        Ok(PeerEndpoint::new(host, port))
    }
}

/// A request parsed from one line of the tracker protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerRequest {
    Register { name: String, endpoint: PeerEndpoint },
    GetPeers { name: String },
    Unknown,
}

/// Parses one line (without the trailing `\n`) into a `TrackerRequest`.
/// Unrecognized verbs parse successfully as `Unknown` rather than erroring,
/// matching the tracker's "respond ERROR, keep the session going" policy.
pub fn parse_request(line: &str) -> TrackerRequest {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("REGISTER") => {
            let name = parts.next();
            let ip = parts.next();
            let port = parts.next().and_then(|p| p.parse::<u16>().ok());
            match (name, ip, port) {
                (Some(name), Some(ip), Some(port)) => TrackerRequest::Register {
                    name: name.to_string(),
                    endpoint: PeerEndpoint::new(ip, port),
                },
                _ => TrackerRequest::Unknown,
            }
        }
        Some("GETPEERS") => match parts.next() {
            Some(name) => TrackerRequest::GetPeers {
                name: name.to_string(),
            },
            None => TrackerRequest::Unknown,
        },
        _ => TrackerRequest::Unknown,
    }
}

/// Renders a GETPEERS response body (without the trailing `\n`): endpoints
/// joined by `;`, empty string if the set is empty.
pub fn render_peer_list(endpoints: &[PeerEndpoint]) -> String {
    endpoints
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

/// Parses a GETPEERS response body, splitting on `;` and discarding empty
/// segments (so a bare `\n` response yields an empty list).
pub fn parse_peer_list(body: &str) -> Vec<PeerEndpoint> {
    body.split(';')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}
