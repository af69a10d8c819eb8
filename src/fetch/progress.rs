//! Process-wide map of in-flight and completed downloads, read by the (out
//! of scope) UI layer. No logic beyond mutex-guarded map access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub request_name: String,
    pub save_name: String,
    pub total_chunks: u64,
    pub completed_chunks: u64,
    pub finished: bool,
}

impl DownloadProgress {
    fn new(save_name: &str, request_name: &str, total_chunks: u64) -> Self {
        DownloadProgress {
            request_name: request_name.to_string(),
            save_name: save_name.to_string(),
            total_chunks,
            completed_chunks: 0,
            finished: total_chunks == 0,
        }
    }
}

/// `save_name -> DownloadProgress`, one process-wide instance shared by
/// every fetch engine invocation via `Arc` clone.
#[derive(Debug, Clone, Default)]
pub struct ProgressRegistry {
    inner: Arc<Mutex<HashMap<String, DownloadProgress>>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        ProgressRegistry::default()
    }

    pub fn start(&self, save_name: &str, request_name: &str, total_chunks: u64) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(
            save_name.to_string(),
            DownloadProgress::new(save_name, request_name, total_chunks),
        );
    }

    /// Increments `completed_chunks` for `save_name` by one and sets
    /// `finished` once it reaches `total_chunks`. No-op if the entry is
    /// missing (it always exists by the time a worker finishes a chunk).
    pub fn record_chunk(&self, save_name: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = map.get_mut(save_name) {
            entry.completed_chunks += 1;
            if entry.completed_chunks >= entry.total_chunks {
                entry.finished = true;
            }
        }
    }

    pub fn get(&self, save_name: &str) -> Option<DownloadProgress> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(save_name).cloned()
    }

    /// Snapshot of every tracked download, for the UI layer to scrape.
    pub fn snapshot(&self) -> Vec<DownloadProgress> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unfinished_and_completes_after_all_chunks() {
        let registry = ProgressRegistry::new();
        registry.start("x.bin", "x.bin", 3);
        assert_eq!(registry.get("x.bin").unwrap().completed_chunks, 0);
        assert!(!registry.get("x.bin").unwrap().finished);

        registry.record_chunk("x.bin");
        registry.record_chunk("x.bin");
        assert!(!registry.get("x.bin").unwrap().finished);

        registry.record_chunk("x.bin");
        let progress = registry.get("x.bin").unwrap();
        assert_eq!(progress.completed_chunks, 3);
        assert!(progress.finished);
    }

    #[test]
    fn zero_chunk_download_starts_finished() {
        let registry = ProgressRegistry::new();
        registry.start("empty.bin", "empty.bin", 0);
        assert!(registry.get("empty.bin").unwrap().finished);
    }

    #[test]
    fn completed_chunks_never_decreases_across_observations() {
        let registry = ProgressRegistry::new();
        registry.start("y.bin", "y.bin", 5);
        let mut last = 0;
        for _ in 0..5 {
            registry.record_chunk("y.bin");
            let now = registry.get("y.bin").unwrap().completed_chunks;
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn snapshot_includes_every_tracked_download() {
        let registry = ProgressRegistry::new();
        registry.start("a.bin", "a.bin", 1);
        registry.start("b.bin", "b.bin", 2);
        let names: Vec<_> = registry
            .snapshot()
            .into_iter()
            .map(|p| p.request_name)
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"a.bin".to_string()));
        assert!(names.contains(&"b.bin".to_string()));
    }

    #[test]
    fn save_name_distinguishes_two_downloads_of_the_same_file() {
        let registry = ProgressRegistry::new();
        registry.start("copy1.bin", "x.bin", 1);
        registry.start("copy2.bin", "x.bin", 1);

        let copy1 = registry.get("copy1.bin").unwrap();
        let copy2 = registry.get("copy2.bin").unwrap();
        assert_eq!(copy1.request_name, "x.bin");
        assert_eq!(copy2.request_name, "x.bin");
        assert_eq!(copy1.save_name, "copy1.bin");
        assert_eq!(copy2.save_name, "copy2.bin");
    }
}
