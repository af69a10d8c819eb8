use clap::{Parser, Subcommand};

use peerline::config::Config;
use peerline::env;
use peerline::fetch::engine::{self, FetchConfig, FetchRequest};
use peerline::fetch::progress::ProgressRegistry;
use peerline::paths;
use peerline::peer::server::PeerServer;
use peerline::tracker::client;
use peerline::tracker::protocol::PeerEndpoint;
use peerline::tracker::server::Tracker;

#[derive(Parser, Debug)]
#[clap(version, about = "peer-to-peer chunked file distribution")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the tracker service: REGISTER / GETPEERS over TCP.
    Tracker {
        #[clap(short, long, default_value_t = peerline::DEFAULT_TRACKER_PORT)]
        port: u16,
    },
    /// Run the peer data-plane server, then drop into a share/download/list/exit REPL.
    Peer {
        #[clap(short, long, default_value_t = 0)]
        port: u16,
        #[clap(long, default_value = "127.0.0.1")]
        tracker_ip: String,
        #[clap(long, default_value_t = peerline::DEFAULT_TRACKER_PORT)]
        tracker_port: u16,
    },
    /// Copy a file into shared_files/ and register it with the tracker.
    Share {
        path: String,
        #[clap(long, default_value_t = 0)]
        my_port: u16,
        #[clap(long, default_value = "127.0.0.1")]
        tracker_ip: String,
        #[clap(long, default_value_t = peerline::DEFAULT_TRACKER_PORT)]
        tracker_port: u16,
    },
    /// Fetch a file known to the tracker and write it under downloads/.
    Download {
        name: String,
        #[clap(long)]
        saveas: Option<String>,
        #[clap(long, default_value_t = 0)]
        my_port: u16,
        #[clap(long, default_value = "127.0.0.1")]
        tracker_ip: String,
        #[clap(long, default_value_t = peerline::DEFAULT_TRACKER_PORT)]
        tracker_port: u16,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::load_or_create().unwrap_or_else(|e| {
        log::warn!("falling back to default config: {e}");
        Config::default()
    });
    let cli = Cli::parse();

    paths::ensure_layout()?;

    match cli.command {
        Command::Tracker { port } => run_tracker(port),
        Command::Peer {
            port,
            tracker_ip,
            tracker_port,
        } => run_peer(port, tracker_ip, tracker_port, &config),
        Command::Share {
            path,
            my_port,
            tracker_ip,
            tracker_port,
        } => share(&path, my_port, &tracker_ip, tracker_port),
        Command::Download {
            name,
            saveas,
            my_port,
            tracker_ip,
            tracker_port,
        } => {
            let progress = ProgressRegistry::new();
            download(
                &name,
                saveas,
                my_port,
                &tracker_ip,
                tracker_port,
                &progress,
                &fetch_config(&config),
            )
        }
    }
}

fn fetch_config(config: &Config) -> FetchConfig {
    FetchConfig {
        max_workers: config.max_workers,
        socket_timeout: config.socket_timeout(),
        chunk_deadline: config.chunk_deadline(),
        max_attempts: config.max_attempts,
    }
}

/// Binds and runs the tracker service. A bind failure is the one fatal
/// error this component raises; it propagates out of `main`.
fn run_tracker(port: u16) -> anyhow::Result<()> {
    let tracker = Tracker::bind(("0.0.0.0", port))?;
    tracker.run()?;
    Ok(())
}

/// Starts the data-plane server on a background thread, then drives the
/// `share` / `download` / `list` / `exit` REPL described in spec.md §6. The
/// REPL's exact prompt text and UX polish are out of core scope; this is
/// the thin collaborator the library exposes for it.
fn run_peer(port: u16, tracker_ip: String, tracker_port: u16, config: &Config) -> anyhow::Result<()> {
    let server = PeerServer::bind(("0.0.0.0", port))?;
    let my_port = server.local_addr()?.port();
    std::thread::spawn(move || {
        if let Err(e) = server.run() {
            log::error!("peer data plane stopped: {e}");
        }
    });

    let progress = ProgressRegistry::new();
    let fetch_config = fetch_config(config);

    println!("peerline peer ready on port {my_port}. Commands: share <path> | download <name> [saveas] | list <name> | exit");
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let mut parts = line.trim().split_whitespace();
        match parts.next() {
            Some("share") => {
                if let Some(path) = parts.next() {
                    if let Err(e) = share(path, my_port, &tracker_ip, tracker_port) {
                        println!("share failed: {e}");
                    }
                } else {
                    println!("usage: share <path>");
                }
            }
            Some("download") => {
                if let Some(name) = parts.next() {
                    let saveas = parts.next().map(str::to_string);
                    if let Err(e) = download(
                        name,
                        saveas,
                        my_port,
                        &tracker_ip,
                        tracker_port,
                        &progress,
                        &fetch_config,
                    ) {
                        println!("download failed: {e}");
                    }
                } else {
                    println!("usage: download <name> [saveas]");
                }
            }
            Some("list") => {
                if let Some(name) = parts.next() {
                    let peers = client::get_peers((tracker_ip.as_str(), tracker_port), name);
                    println!("{} peers known for {name}", peers.len());
                    for peer in peers {
                        println!("  {peer}");
                    }
                } else {
                    for entry in progress.snapshot() {
                        println!(
                            "{} (as {}): {}/{} chunks, finished={}",
                            entry.request_name,
                            entry.save_name,
                            entry.completed_chunks,
                            entry.total_chunks,
                            entry.finished
                        );
                    }
                }
            }
            Some("exit") => break,
            Some(other) => println!("unknown command: {other}"),
            None => {}
        }
    }
    Ok(())
}

/// Copies `path` into `shared_files/` under its own filename and registers
/// it with the tracker under this peer's endpoint.
fn share(path: &str, my_port: u16, tracker_ip: &str, tracker_port: u16) -> anyhow::Result<()> {
    let source = std::path::Path::new(path);
    let name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("{path} has no file name"))?
        .to_string_lossy()
        .into_owned();

    let dest = std::path::Path::new(peerline::SHARED_DIR).join(&name);
    std::fs::copy(source, &dest)?;

    let my_port = if my_port == 0 {
        env::free_port()?
    } else {
        my_port
    };
    let self_ip = env::local_ip();
    let endpoint = PeerEndpoint::new(self_ip, my_port);
    let ok = client::register_with_retry(tracker_ip, tracker_port, &name, &endpoint);
    if ok {
        println!("sharing {name} as {endpoint}");
    } else {
        println!("copied {name} to shared_files/ but could not register with the tracker");
    }
    Ok(())
}

/// Queries the tracker for peers advertising `name` and hands the list to
/// the fetch engine.
#[allow(clippy::too_many_arguments)]
fn download(
    name: &str,
    saveas: Option<String>,
    my_port: u16,
    tracker_ip: &str,
    tracker_port: u16,
    progress: &ProgressRegistry,
    fetch_config: &FetchConfig,
) -> anyhow::Result<()> {
    let peers = client::get_peers((tracker_ip, tracker_port), name);
    if peers.is_empty() {
        println!("no peers known for {name}");
        return Ok(());
    }

    let request = FetchRequest {
        request_name: name.to_string(),
        save_name: saveas.unwrap_or_else(|| name.to_string()),
        peers,
        self_ip: env::local_ip(),
        my_port,
        tracker_ip: tracker_ip.to_string(),
        tracker_port,
    };
    engine::fetch(request, progress, fetch_config);
    Ok(())
}
