//! Wire types for the peer data-plane protocol:
//!
//! ```text
//! L->S : FILESIZE <name>\n
//! S->L : <decimal>\n
//!
//! L->S : SENDCHUNK <name> <index>\n
//! S->L : <raw bytes, 0..CHUNK_SIZE>          (connection closed after send)
//!
//! L->S : <bare name>\n
//! S->L : <raw bytes, entire file>            (connection closed after send)
//! ```

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRequest {
    FileSize { name: String },
    SendChunk { name: String, index: u64 },
    WholeFile { name: String },
}

/// Parses one request line (without the trailing `\n`). There is no
/// "unrecognized verb" case here: anything that doesn't match FILESIZE or
/// SENDCHUNK is the legacy bare-filename whole-file request, per spec.md
/// §4.1's table.
pub fn parse_request(line: &str) -> PeerRequest {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("FILESIZE") => {
            let name = parts.next().unwrap_or_default().to_string();
            PeerRequest::FileSize { name }
        }
        Some("SENDCHUNK") => {
            let name = parts.next().unwrap_or_default().to_string();
            let index = parts.next().and_then(|i| i.parse().ok()).unwrap_or(0);
            PeerRequest::SendChunk { name, index }
        }
        Some(other) => PeerRequest::WholeFile {
            name: other.to_string(),
        },
        None => PeerRequest::WholeFile {
            name: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filesize() {
        assert_eq!(
            parse_request("FILESIZE x.bin"),
            PeerRequest::FileSize {
                name: "x.bin".to_string()
            }
        );
    }

    #[test]
    fn parses_sendchunk() {
        assert_eq!(
            parse_request("SENDCHUNK x.bin 3"),
            PeerRequest::SendChunk {
                name: "x.bin".to_string(),
                index: 3
            }
        );
    }

    #[test]
    fn anything_else_is_whole_file() {
        assert_eq!(
            parse_request("x.bin"),
            PeerRequest::WholeFile {
                name: "x.bin".to_string()
            }
        );
    }
}
