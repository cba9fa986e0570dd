//! Engine state, progress and counters.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    Loading = 1,
    Ready = 2,
    Error = 3,
}

impl EngineState {
    /// Loads the state from an atomic.
    pub fn load(atomic: &AtomicU8) -> Self {
        match atomic.load(Ordering::Relaxed) {
            1 => Self::Loading,
            2 => Self::Ready,
            3 => Self::Error,
            _ => Self::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

/// Shared between the worker, which writes, and status readers.
#[derive(Debug, Default)]
pub struct EngineShared {
    pub state: AtomicU8,
    pub directory: Mutex<Option<PathBuf>>,
    pub last_error: Mutex<Option<String>>,
    pub watcher_enabled: AtomicBool,
    pub progress: LoadProgress,
    pub counters: EventCounters,
    pub started_at: AtomicU64,
    pub finished_at: AtomicU64,
    pub last_update_at: AtomicU64,
}

impl EngineShared {
    pub fn set_state(&self, state: EngineState) {
        let previous = self.state.swap(state as u8, Ordering::Relaxed);
        if previous != state as u8 {
            log::debug!("translation engine state={}", state.as_str());
        }
    }

    /// Marks the engine as failed when no usable directory is loaded.
    pub fn fail(&self, message: String) {
        self.set_state(EngineState::Error);
        self.record_error(message);
    }

    pub fn begin_load(&self, directory: PathBuf, total_files: usize) {
        self.set_state(EngineState::Loading);
        *self.directory.lock() = Some(directory);
        self.progress.reset(total_files);
        self.started_at.store(unix_now_secs(), Ordering::Relaxed);
        self.finished_at.store(0, Ordering::Relaxed);
    }

    pub fn finish_load(&self, watcher_enabled: bool) {
        let now = unix_now_secs();
        self.watcher_enabled.store(watcher_enabled, Ordering::Relaxed);
        self.finished_at.store(now, Ordering::Relaxed);
        self.last_update_at.store(now, Ordering::Relaxed);
        *self.progress.current_file.lock() = None;
        *self.last_error.lock() = None;
        self.set_state(EngineState::Ready);
    }

    pub fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }

    pub fn touch(&self) {
        self.last_update_at.store(unix_now_secs(), Ordering::Relaxed);
    }
}

/// Progress of the running or last directory load.
#[derive(Debug, Default)]
pub struct LoadProgress {
    pub total_files: AtomicUsize,
    pub processed_files: AtomicUsize,
    pub current_file: Mutex<Option<PathBuf>>,
}

impl LoadProgress {
    pub fn reset(&self, total_files: usize) {
        self.total_files.store(total_files, Ordering::Relaxed);
        self.processed_files.store(0, Ordering::Relaxed);
        *self.current_file.lock() = None;
    }

    pub fn start_file(&self, path: PathBuf) {
        *self.current_file.lock() = Some(path);
    }

    pub fn finish_file(&self) {
        self.processed_files.fetch_add(1, Ordering::Relaxed);
    }
}

/// Monotonic counters for file-event handling.
#[derive(Debug, Default)]
pub struct EventCounters {
    pub events_received: AtomicU64,
    pub duplicates_dropped: AtomicU64,
    pub reprocessed_files: AtomicU64,
    pub retries: AtomicU64,
    pub retries_exhausted: AtomicU64,
    pub watch_errors: AtomicU64,
    pub rescans: AtomicU64,
}

impl EventCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub directory: Option<PathBuf>,
    pub keys: usize,
    pub watcher_enabled: bool,
    pub total_files: usize,
    pub processed_files: usize,
    pub current_file: Option<PathBuf>,
    pub events_received: u64,
    pub duplicates_dropped: u64,
    pub reprocessed_files: u64,
    pub retries: u64,
    pub retries_exhausted: u64,
    pub watch_errors: u64,
    pub rescans: u64,
    pub cache_hits: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    pub last_update_at: Option<u64>,
    pub last_error: Option<String>,
}

impl EngineStatus {
    pub fn capture(shared: &EngineShared, keys: usize, cache_hits: u64) -> Self {
        let counters = &shared.counters;
        Self {
            state: EngineState::load(&shared.state),
            directory: shared.directory.lock().clone(),
            keys,
            watcher_enabled: shared.watcher_enabled.load(Ordering::Relaxed),
            total_files: shared.progress.total_files.load(Ordering::Relaxed),
            processed_files: shared.progress.processed_files.load(Ordering::Relaxed),
            current_file: shared.progress.current_file.lock().clone(),
            events_received: counters.events_received.load(Ordering::Relaxed),
            duplicates_dropped: counters.duplicates_dropped.load(Ordering::Relaxed),
            reprocessed_files: counters.reprocessed_files.load(Ordering::Relaxed),
            retries: counters.retries.load(Ordering::Relaxed),
            retries_exhausted: counters.retries_exhausted.load(Ordering::Relaxed),
            watch_errors: counters.watch_errors.load(Ordering::Relaxed),
            rescans: counters.rescans.load(Ordering::Relaxed),
            cache_hits,
            started_at: zero_to_none(shared.started_at.load(Ordering::Relaxed)),
            finished_at: zero_to_none(shared.finished_at.load(Ordering::Relaxed)),
            last_update_at: zero_to_none(shared.last_update_at.load(Ordering::Relaxed)),
            last_error: shared.last_error.lock().clone(),
        }
    }
}

/// Returns the current Unix timestamp in seconds.
pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}

/// Converts 0 to None for optional timestamps.
pub fn zero_to_none(value: u64) -> Option<u64> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}
