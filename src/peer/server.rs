//! Peer data-plane server: binds a TCP listener and answers FILESIZE,
//! SENDCHUNK, and the legacy whole-file fallback by reading from the
//! two-directory search path in `paths::resolve`. Each accepted connection
//! runs on its own OS thread — concurrent read-only access to on-disk
//! files is safe, so there is no shared mutable state here to contend on.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use log::{error, info, warn};

use super::protocol::{parse_request, PeerRequest};
use crate::paths::{resolve, validate_name};
use crate::CHUNK_SIZE;

pub struct PeerServer {
    listener: TcpListener,
}

impl PeerServer {
    pub fn bind(addr: impl std::net::ToSocketAddrs) -> std::io::Result<Self> {
        Ok(PeerServer {
            listener: TcpListener::bind(addr)?,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn run(&self) -> std::io::Result<()> {
        info!("peer data plane listening on {:?}", self.local_addr());
        loop {
            let (stream, peer_addr) = self.listener.accept()?;
            thread::spawn(move || {
                if let Err(e) = handle_session(stream) {
                    error!("peer session with {peer_addr} error: {e}");
                }
            });
        }
    }
}

fn handle_session(mut stream: TcpStream) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let line = line.trim_end_matches(['\n', '\r']);

    match parse_request(line) {
        PeerRequest::FileSize { name } => serve_filesize(&mut stream, &name),
        PeerRequest::SendChunk { name, index } => serve_chunk(&mut stream, &name, index),
        PeerRequest::WholeFile { name } => serve_whole_file(&mut stream, &name),
    }
}

fn serve_filesize(stream: &mut TcpStream, name: &str) -> std::io::Result<()> {
    if validate_name(name).is_err() {
        warn!("rejecting unsafe filename in FILESIZE: {name:?}");
        stream.write_all(b"0\n")?;
        return Ok(());
    }
    let path = resolve(name);
    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    info!("FILESIZE {name}: {size} bytes");
    stream.write_all(format!("{size}\n").as_bytes())
}

fn serve_chunk(stream: &mut TcpStream, name: &str, index: u64) -> std::io::Result<()> {
    if validate_name(name).is_err() {
        warn!("rejecting unsafe filename in SENDCHUNK: {name:?}");
        return Ok(());
    }
    let path = resolve(name);
    let mut file = match File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            error!("file not found: {path:?} ({e})");
            return Ok(());
        }
    };
    let file_size = file.metadata()?.len();
    let offset = index * CHUNK_SIZE;
    if offset >= file_size {
        error!("chunk index {index} out of bounds for {path:?}");
        return Ok(());
    }
    let chunk_len = CHUNK_SIZE.min(file_size - offset);
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; chunk_len as usize];
    let got = read_fully(&mut file, &mut buf)?;
    stream.write_all(&buf[..got])?;
    info!("sent chunk {index} of {name} ({got} bytes)");
    Ok(())
}

fn serve_whole_file(stream: &mut TcpStream, name: &str) -> std::io::Result<()> {
    if name.is_empty() || validate_name(name).is_err() {
        return Ok(());
    }
    let path = resolve(name);
    let mut file = match File::open(&path) {
        Ok(f) => f,
        Err(_) => return Ok(()),
    };
    let mut buf = vec![0u8; CHUNK_SIZE as usize];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n])?;
        total += n as u64;
    }
    info!("sent whole file {name} ({total} bytes)");
    Ok(())
}

/// Reads until `buf` is full or EOF is hit, whichever comes first — the
/// last chunk of a file is shorter than `CHUNK_SIZE` and that's expected,
/// not an error.
fn read_fully(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match file.read(&mut buf[got..])? {
            0 => break,
            n => got += n,
        }
    }
    Ok(got)
}
