//! Bounded, persisted log of verification attempts.
//!
//! Appends go to an in-memory ring capped at `cap` records. Every
//! `flush_every` appends the caller is told a checkpoint was reached and may
//! flush; the whole log is rewritten atomically (temp file + rename). A
//! missing or unreadable file loads as an empty history.

use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::domain::models::{AttemptRecord, LearningConfig};

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Backing file. `None` keeps history in memory only.
    pub path: Option<PathBuf>,
    pub cap: usize,
    pub flush_every: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("./data/strategy_history.json")),
            cap: 1000,
            flush_every: 10,
        }
    }
}

impl From<&LearningConfig> for HistoryConfig {
    fn from(config: &LearningConfig) -> Self {
        Self {
            path: Some(PathBuf::from(&config.history_path)),
            cap: config.history_cap.max(1),
            flush_every: config.recompute_every.max(1),
        }
    }
}

impl HistoryConfig {
    pub fn in_memory(cap: usize) -> Self {
        Self {
            path: None,
            cap,
            ..Default::default()
        }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct HistoryState {
    records: VecDeque<AttemptRecord>,
    appends: u64,
}

pub struct StrategyHistory {
    config: HistoryConfig,
    state: Mutex<HistoryState>,
    /// Serializes writers so a newer snapshot is never overwritten by an older one.
    flush_lock: Mutex<()>,
}

impl StrategyHistory {
    /// Open the history, loading any records already on disk.
    pub fn open(config: HistoryConfig) -> Self {
        let cap = config.cap.max(1);
        let mut records = config
            .path
            .as_deref()
            .map(load_records)
            .unwrap_or_default();
        if records.len() > cap {
            let excess = records.len() - cap;
            records.drain(..excess);
        }

        Self {
            config: HistoryConfig { cap, ..config },
            state: Mutex::new(HistoryState {
                records: records.into(),
                appends: 0,
            }),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn in_memory(cap: usize) -> Self {
        Self::open(HistoryConfig::in_memory(cap))
    }

    pub fn path(&self) -> Option<&Path> {
        self.config.path.as_deref()
    }

    pub const fn cap(&self) -> usize {
        self.config.cap
    }

    /// Append a record, dropping the oldest when full.
    ///
    /// Returns `true` when this append lands on a checkpoint (every
    /// `flush_every` appends).
    pub fn append(&self, record: AttemptRecord) -> bool {
        let mut state = self.lock_state();
        if state.records.len() >= self.config.cap {
            state.records.pop_front();
        }
        state.records.push_back(record);
        state.appends += 1;
        let every = self.config.flush_every.max(1) as u64;
        state.appends % every == 0
    }

    /// The last `n` records in insertion order.
    pub fn snapshot(&self, n: usize) -> Vec<AttemptRecord> {
        let state = self.lock_state();
        let skip = state.records.len().saturating_sub(n);
        state.records.iter().skip(skip).cloned().collect()
    }

    pub fn all(&self) -> Vec<AttemptRecord> {
        self.snapshot(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.lock_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the history and persist the empty log.
    pub fn clear(&self) {
        self.lock_state().records.clear();
        info!("Strategy history cleared");
        self.flush();
    }

    /// Write the current log to disk. Failures are logged and the in-memory
    /// state is kept.
    pub fn flush(&self) {
        let Some(path) = self.config.path.as_deref() else {
            return;
        };
        let _writer = self
            .flush_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let records = self.all();
        match write_atomic(path, &records) {
            Ok(()) => debug!(path = %path.display(), records = records.len(), "Strategy history flushed"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to persist strategy history"),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HistoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for StrategyHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyHistory")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

fn load_records(path: &Path) -> Vec<AttemptRecord> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read strategy history, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<AttemptRecord>>(&raw) {
        Ok(records) => {
            info!(path = %path.display(), records = records.len(), "Loaded strategy history");
            records
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt strategy history, starting empty");
            Vec::new()
        }
    }
}

fn write_atomic(path: &Path, records: &[AttemptRecord]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(records)?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&json)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Strategy;
    use tempfile::TempDir;

    fn record(i: usize) -> AttemptRecord {
        AttemptRecord::new(Strategy::ApiDirect, i % 2 == 0, 1.0).for_handle(1, format!("h{i}"))
    }

    #[test]
    fn test_append_respects_cap() {
        let history = StrategyHistory::in_memory(5);
        for i in 0..12 {
            history.append(record(i));
        }
        assert_eq!(history.len(), 5);
        let names: Vec<_> = history
            .all()
            .into_iter()
            .filter_map(|r| r.username)
            .collect();
        assert_eq!(names, vec!["h7", "h8", "h9", "h10", "h11"]);
    }

    #[test]
    fn test_checkpoint_every_k_appends_even_when_full() {
        let history = StrategyHistory::open(HistoryConfig {
            path: None,
            cap: 3,
            flush_every: 4,
        });
        let checkpoints: Vec<bool> = (0..8).map(|i| history.append(record(i))).collect();
        assert_eq!(
            checkpoints,
            vec![false, false, false, true, false, false, false, true]
        );
    }

    #[test]
    fn test_snapshot_returns_tail_in_order() {
        let history = StrategyHistory::in_memory(10);
        for i in 0..4 {
            history.append(record(i));
        }
        let tail = history.snapshot(2);
        assert_eq!(tail[0].username.as_deref(), Some("h2"));
        assert_eq!(tail[1].username.as_deref(), Some("h3"));
        assert_eq!(history.snapshot(100).len(), 4);
    }

    #[test]
    fn test_flush_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.json");
        let history = StrategyHistory::open(HistoryConfig::at_path(&path));
        for i in 0..3 {
            history.append(record(i));
        }
        history.flush();

        let reloaded = StrategyHistory::open(HistoryConfig::at_path(&path));
        assert_eq!(reloaded.all(), history.all());
        assert!(!path.with_file_name("history.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();
        let history = StrategyHistory::open(HistoryConfig::at_path(&path));
        assert!(history.is_empty());
    }

    #[test]
    fn test_oversized_file_is_truncated_to_newest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let records: Vec<_> = (0..10).map(record).collect();
        fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

        let history = StrategyHistory::open(HistoryConfig {
            path: Some(path),
            cap: 4,
            flush_every: 10,
        });
        assert_eq!(history.len(), 4);
        assert_eq!(history.all()[0].username.as_deref(), Some("h6"));
    }

    #[test]
    fn test_clear_persists_empty_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let history = StrategyHistory::open(HistoryConfig::at_path(&path));
        history.append(record(0));
        history.flush();
        history.clear();

        let raw = fs::read_to_string(&path).unwrap();
        let on_disk: Vec<AttemptRecord> = serde_json::from_str(&raw).unwrap();
        assert!(on_disk.is_empty());
    }

    #[test]
    fn test_unwritable_path_keeps_memory_state() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let history = StrategyHistory::open(HistoryConfig::at_path(blocker.join("history.json")));
        history.append(record(0));
        history.flush();
        assert_eq!(history.len(), 1);
    }
}
