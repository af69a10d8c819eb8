//! `filename -> set<PeerEndpoint>` registry, the tracker's sole piece of
//! state. Owned exclusively by the tracker process; sessions access it
//! under a single mutex. Set iteration order reflects insertion order so
//! GETPEERS responses are deterministic across repeated tests.

use std::collections::HashMap;
use std::sync::Mutex;

use super::protocol::PeerEndpoint;

#[derive(Debug, Default)]
pub struct Registry {
    // Insertion-ordered: a Vec with a linear duplicate check, mirroring the
    // source's `std::vector` + `std::find` registry exactly. Filenames and
    // per-file peer counts are both small in practice (§2: tracker share of
    // core is ~10%, not a hot path needing a smarter index).
    inner: Mutex<HashMap<String, Vec<PeerEndpoint>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Appends `endpoint` to the set for `name` if not already present.
    /// Idempotent: registering the same `(name, endpoint)` repeatedly
    /// leaves the set unchanged after the first call.
    pub fn register(&self, name: &str, endpoint: PeerEndpoint) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = guard.entry(name.to_string()).or_default();
        if !entry.contains(&endpoint) {
            entry.push(endpoint);
        }
    }

    /// Endpoints advertising `name`, in insertion order. Empty if `name`
    /// was never registered.
    pub fn peers(&self, name: &str) -> Vec<PeerEndpoint> {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(name).cloned().unwrap_or_default()
    }
}
