//! Tracker service: binds TCP on a well-known port and, for each accepted
//! connection, reads one line, answers REGISTER / GETPEERS / unknown
//! command, and closes. Sessions run on independent OS threads and
//! synchronize only on the registry's mutex — no cooperative event loop,
//! matching spec.md §5's scheduling model.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use log::{error, info};

use super::protocol::{parse_request, render_peer_list, TrackerRequest};
use super::registry::Registry;

pub struct Tracker {
    registry: Arc<Registry>,
    listener: TcpListener,
}

impl Tracker {
    /// Binds the tracker's listener. A bind failure here is the one fatal
    /// error spec.md §7 names for this component; callers propagate it.
    pub fn bind(addr: impl std::net::ToSocketAddrs) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Tracker {
            registry: Arc::new(Registry::new()),
            listener,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accepts connections forever, spawning one thread per session. Never
    /// returns except on a listener-level I/O error; a single session
    /// erroring never takes down the acceptor loop.
    pub fn run(&self) -> std::io::Result<()> {
        info!("tracker listening on {:?}", self.local_addr());
        loop {
            let (stream, peer_addr) = self.listener.accept()?;
            let registry = Arc::clone(&self.registry);
            thread::spawn(move || {
                if let Err(e) = handle_session(stream, &registry) {
                    error!("tracker session with {peer_addr} error: {e}");
                }
            });
        }
    }
}

fn handle_session(mut stream: TcpStream, registry: &Registry) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let line = line.trim_end_matches(['\n', '\r']);

    match parse_request(line) {
        TrackerRequest::Register { name, endpoint } => {
            info!("REGISTER {name} <- {endpoint}");
            registry.register(&name, endpoint);
            stream.write_all(b"OK\n")?;
        }
        TrackerRequest::GetPeers { name } => {
            let peers = registry.peers(&name);
            let body = render_peer_list(&peers);
            info!("GETPEERS {name} -> {body}");
            stream.write_all(body.as_bytes())?;
            stream.write_all(b"\n")?;
        }
        TrackerRequest::Unknown => {
            stream.write_all(b"ERROR Unknown command\n")?;
        }
    }
    Ok(())
}
