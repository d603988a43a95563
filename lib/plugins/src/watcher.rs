//! Polling-based file watcher. Deliberately hand-rolled rather than
//! backed by OS file-event APIs: the debounce window absorbs editors that
//! write a file in several short bursts, and polling keeps the watcher's
//! behaviour identical across platforms.

use aether::time::timestamp_secs;
use hashbrown::HashMap;
use slog::Logger;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

#[derive(Clone, Debug)]
struct WatchEntry {
    path: PathBuf,
    last_modified: Option<u64>,
    last_seen_change: Option<u64>,
}

/// A file change observed by `poll`, already past its debounce window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
}

pub struct FileWatcher {
    entries: RwLock<HashMap<PathBuf, WatchEntry>>,
    debounce: Duration,
    log: Logger,
}

impl FileWatcher {
    pub fn new(log: &Logger) -> Self {
        FileWatcher::with_debounce(Duration::from_millis(DEFAULT_DEBOUNCE_MS), log)
    }

    pub fn with_debounce(debounce: Duration, log: &Logger) -> Self {
        FileWatcher {
            entries: RwLock::new(HashMap::new()),
            debounce,
            log: log.new(slog::o!("component" => "plugin-watcher")),
        }
    }

    pub fn watch(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let last_modified = modified_secs(&path);
        self.entries.write().unwrap().insert(
            path.clone(),
            WatchEntry {
                path,
                last_modified,
                last_seen_change: None,
            },
        );
    }

    pub fn unwatch(&self, path: impl AsRef<Path>) {
        self.entries.write().unwrap().remove(path.as_ref());
    }

    /// Checks every watched path's mtime. A path whose mtime advanced starts
    /// (or continues) its debounce window; once `debounce` has elapsed since
    /// the first observed change, it is reported and the window resets.
    /// Missing or unreadable paths are skipped silently.
    pub fn poll(&self) -> Vec<FileChange> {
        let now = timestamp_secs();
        let debounce_secs = self.debounce.as_secs().max(1);
        let mut changes = Vec::new();
        let mut entries = self.entries.write().unwrap();

        for entry in entries.values_mut() {
            let current = match modified_secs(&entry.path) {
                Some(m) => m,
                None => continue,
            };

            if Some(current) != entry.last_modified {
                entry.last_modified = Some(current);
                if entry.last_seen_change.is_none() {
                    entry.last_seen_change = Some(now);
                }
            }

            if let Some(changed_at) = entry.last_seen_change {
                if now.saturating_sub(changed_at) >= debounce_secs {
                    slog::debug!(self.log, "file change debounced through"; "path" => %entry.path.display());
                    changes.push(FileChange { path: entry.path.clone() });
                    entry.last_seen_change = None;
                }
            }
        }

        changes
    }
}

fn modified_secs(path: &Path) -> Option<u64> {
    let metadata = fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    modified.duration_since(std::time::UNIX_EPOCH).ok().map(|d| d.as_secs())
}
