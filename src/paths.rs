//! Two-directory filesystem layout shared by the peer data plane and the
//! fetch engine: `shared_files/` (files this peer advertises) and
//! `downloads/` (fetch destinations), both relative to the process CWD.

use std::path::{Path, PathBuf};

use crate::error::ProtocolError;
use crate::{DOWNLOADS_DIR, SHARED_DIR};

/// Rejects filenames that are not a single normal path component, closing
/// the path-traversal risk spec.md §9 flags in the bare-filename fallback.
pub fn validate_name(name: &str) -> Result<(), ProtocolError> {
    if name.is_empty() {
        return Err(ProtocolError::UnsafeName(name.to_string()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => Ok(()),
        _ => Err(ProtocolError::UnsafeName(name.to_string())),
    }
}

/// Resolve an incoming filename to an on-disk path following spec.md §4.1's
/// search order: `shared_files/F`, then `downloads/F`, then `F` relative to
/// CWD. If none exists, returns the nominal `downloads/F` path so size
/// queries return 0 and chunk requests log a not-found error rather than
/// failing outright.
pub fn resolve(name: &str) -> PathBuf {
    let shared = Path::new(SHARED_DIR).join(name);
    if shared.exists() {
        return shared;
    }
    let downloaded = Path::new(DOWNLOADS_DIR).join(name);
    if downloaded.exists() {
        return downloaded;
    }
    let cwd = Path::new(name);
    if cwd.exists() {
        return cwd.to_path_buf();
    }
    downloaded
}

/// Create the two well-known directories if they do not already exist.
pub fn ensure_layout() -> std::io::Result<()> {
    std::fs::create_dir_all(SHARED_DIR)?;
    std::fs::create_dir_all(DOWNLOADS_DIR)?;
    Ok(())
}
