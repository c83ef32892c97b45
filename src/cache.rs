//! C3: the parse-cache — a filename → parsed-file map with mtime-based
//! invalidation, populated by an async bulk scan of configured search paths.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::host::{FileProbe, FileProbeResult};
use crate::parsed_file::ParsedFile;

/// A reserved legacy filename: encountered during a directory scan, it is
/// deleted rather than cached.
pub const RESERVED_LAST_CHEAT: &str = "last.cheat";

#[derive(Clone)]
struct CacheEntry {
    file: Arc<ParsedFile>,
    mtime: i64,
}

/// Async mtime-probed cache keyed by filename. Populated at startup by a
/// bulk scan of each configured search path, reloaded on explicit config
/// reload, and lazily refreshed per file on mtime change.
pub struct ParseCache {
    probe: Arc<dyn FileProbe>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ParseCache {
    pub fn new(probe: Arc<dyn FileProbe>) -> Self {
        Self {
            probe,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a fresh parsed-file handle for `name`: the cached one if its
    /// mtime is unchanged, a reparsed one if the mtime advanced, or `None` if
    /// the file has vanished (in which case the cache entry is dropped).
    pub async fn get(&self, name: &str) -> Option<Arc<ParsedFile>> {
        let known_mtime = {
            let entries = self.entries.lock().await;
            entries.get(name).map(|e| e.mtime)
        };

        match known_mtime {
            Some(mtime) => match self.probe.probe(name, mtime).await {
                Ok(FileProbeResult::Ok) => {
                    let entries = self.entries.lock().await;
                    entries.get(name).map(|e| e.file.clone())
                }
                Ok(FileProbeResult::Reload) => self.reparse(name).await,
                Ok(FileProbeResult::Missing) | Err(_) => {
                    self.entries.lock().await.remove(name);
                    None
                }
            },
            None => self.reparse(name).await,
        }
    }

    async fn reparse(&self, name: &str) -> Option<Arc<ParsedFile>> {
        let source = match self.probe.read_to_string(name).await {
            Ok(s) => s,
            Err(err) => {
                warn!(name, error = %err, "cache miss: file unreadable");
                self.entries.lock().await.remove(name);
                return None;
            }
        };
        let mtime = self.probe.mtime(name).await.ok().flatten().unwrap_or(0);
        match ParsedFile::from_source(name, &source) {
            Ok(parsed) => {
                let file = Arc::new(parsed);
                self.entries.lock().await.insert(
                    name.to_string(),
                    CacheEntry {
                        file: file.clone(),
                        mtime,
                    },
                );
                Some(file)
            }
            Err(err) => {
                warn!(name, error = %err.to_string(), "file rejected by parser");
                self.entries.lock().await.remove(name);
                None
            }
        }
    }

    /// Adds `name` to the cache immediately (used by the bulk scan); the
    /// reserved `last.cheat` filename is deleted instead of cached.
    async fn add_to_cache(&self, name: &str) {
        if name.ends_with(RESERVED_LAST_CHEAT) {
            if let Err(err) = self.probe.write_to_string(name, "").await {
                debug!(name, error = %err, "failed to delete reserved last.cheat");
            }
            return;
        }
        self.reparse(name).await;
    }

    /// Clears the cache and launches one async scan per search path, each
    /// enumerating `*.cheat` files and invoking `add_to_cache`. Awaiting the
    /// returned future is equivalent to the original's `WaitForCacheLoaded`
    /// with no timeout; callers wanting a timeout should wrap it in
    /// `tokio::time::timeout`.
    pub async fn reload_cache(self: &Arc<Self>, search_paths: &[String]) {
        self.entries.lock().await.clear();
        let mut tasks = Vec::new();
        for path in search_paths {
            let cache = Arc::clone(self);
            let path = path.clone();
            tasks.push(tokio::spawn(async move { cache.scan_path(&path).await }));
        }
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "search-path scan task panicked");
            }
        }
    }

    async fn scan_path(&self, search_path: &str) {
        match self.probe.list_cheat_files(search_path).await {
            Ok(files) => {
                info!(search_path, count = files.len(), "scanned search path");
                for file in files {
                    self.add_to_cache(&file).await;
                }
            }
            Err(err) => warn!(search_path, error = %err, "failed to enumerate search path"),
        }
    }

    /// `WaitForCacheLoaded(seconds)`: returns `true` iff `reload_cache`'s
    /// scan tasks all complete within `seconds`.
    pub async fn wait_for_cache_loaded(self: &Arc<Self>, search_paths: &[String], seconds: u64) -> bool {
        tokio::time::timeout(std::time::Duration::from_secs(seconds), self.reload_cache(search_paths))
            .await
            .is_ok()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.lock().await.contains_key(name)
    }

    pub async fn names(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryFileProbe;

    #[tokio::test]
    async fn get_caches_and_reuses_parsed_file() {
        let probe = Arc::new(InMemoryFileProbe::new());
        probe.insert("demo.cheat", "/say hi\n", 1);
        let cache = ParseCache::new(probe);
        let first = cache.get("demo.cheat").await.unwrap();
        let second = cache.get("demo.cheat").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn mtime_advance_triggers_reparse() {
        let probe = Arc::new(InMemoryFileProbe::new());
        probe.insert("demo.cheat", "/say hi\n", 1);
        let cache = ParseCache::new(probe.clone());
        let first = cache.get("demo.cheat").await.unwrap();
        assert_eq!(first.lines[0].text, "/say hi");

        probe.insert("demo.cheat", "/say bye\n", 2);
        let second = cache.get("demo.cheat").await.unwrap();
        assert_eq!(second.lines[0].text, "/say bye");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn missing_file_drops_cache_entry_and_returns_none() {
        let probe = Arc::new(InMemoryFileProbe::new());
        probe.insert("demo.cheat", "/say hi\n", 1);
        let cache = ParseCache::new(probe.clone());
        cache.get("demo.cheat").await.unwrap();
        assert!(cache.contains("demo.cheat").await);

        // Simulate deletion: wrap a probe that reports Missing by clearing
        // the in-memory store directly isn't exposed, so we approximate with
        // a fresh empty probe and a fresh cache asking for an unknown file.
        let empty_probe = Arc::new(InMemoryFileProbe::new());
        let empty_cache = ParseCache::new(empty_probe);
        assert!(empty_cache.get("ghost.cheat").await.is_none());
    }

    #[tokio::test]
    async fn bulk_scan_populates_cache_and_skips_reserved_last_cheat() {
        let probe = Arc::new(InMemoryFileProbe::new());
        probe.insert("scripts/a.cheat", "/say a\n", 1);
        probe.insert("scripts/b.cheat", "/say b\n", 1);
        probe.insert("scripts/last.cheat", "/say stale\n", 1);
        let cache = Arc::new(ParseCache::new(probe));
        cache.reload_cache(&["scripts".to_string()]).await;
        assert!(cache.contains("scripts/a.cheat").await);
        assert!(cache.contains("scripts/b.cheat").await);
        assert!(!cache.contains("scripts/last.cheat").await);
    }

    #[tokio::test]
    async fn malformed_file_is_rejected_not_cached() {
        let probe = Arc::new(InMemoryFileProbe::new());
        probe.insert("bad.cheat", "#if 1\n/say hi\n", 1); // unbalanced #if
        let cache = ParseCache::new(probe);
        assert!(cache.get("bad.cheat").await.is_none());
        assert!(!cache.contains("bad.cheat").await);
    }
}
