//! The translation lookup engine.
//!
//! A [`TranslationEngine`] owns one background worker thread. The worker
//! loads a directory, watches it, and applies file changes to the shared
//! [`TranslationTable`]; lookups read the table directly from the calling
//! thread and never wait on disk.

mod load;
mod pending;
mod status;
mod worker;

pub use load::{LoadReport, LoadWarning};
pub use status::{EngineState, EngineStatus};

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};

use crate::config::{EngineOptions, LookupConfig};
use crate::error::{LookupError, Result};
use crate::table::TranslationTable;
use crate::types::Token;
use crate::watcher::{normalize_event_path, FileEvent};
use status::EngineShared;
use worker::{Command, Worker};

const WORKER_THREAD_NAME: &str = "translation-index";

/// Handle to the lookup engine. Dropping it stops the worker and the watch.
#[derive(Debug)]
pub struct TranslationEngine {
    table: Arc<TranslationTable>,
    shared: Arc<EngineShared>,
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl TranslationEngine {
    /// Starts the worker thread. The engine is empty until
    /// [`load_directory`](Self::load_directory) succeeds.
    pub fn new(options: EngineOptions) -> Result<Self> {
        let table = Arc::new(TranslationTable::new(options.resolved_cache_capacity));
        let shared = Arc::new(EngineShared::default());
        let (commands, commands_rx) = unbounded();

        let worker = Worker::new(commands_rx, table.clone(), shared.clone());
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            table,
            shared,
            commands,
            worker: Some(handle),
        })
    }

    /// Replaces the active directory with `config.directory`.
    ///
    /// Blocks until the directory has been read and the watch is running.
    /// Configuration errors leave the previous directory active. A directory
    /// without matching files is not an error; see
    /// [`LoadReport::is_empty_directory`].
    pub fn load_directory(&self, config: LookupConfig) -> Result<LoadReport> {
        let (reply, reply_rx) = bounded(1);
        self.commands
            .send(Command::Load { config, reply })
            .map_err(|_| LookupError::WorkerUnavailable)?;
        reply_rx
            .recv()
            .map_err(|_| LookupError::WorkerUnavailable)?
    }

    /// Delivers a file event as if the watcher had reported it.
    pub fn notify(&self, event: FileEvent) -> Result<()> {
        self.commands
            .send(Command::Event(event))
            .map_err(|_| LookupError::WorkerUnavailable)
    }

    /// Looks up `key`, falling back to the configured suffixes.
    ///
    /// Outcomes, including misses, are memoized until the files they depend
    /// on change.
    pub fn try_get(&self, key: &str) -> Option<Token> {
        self.table.resolve(key)
    }

    /// Looks up `key` exactly, without suffixes or the resolved cache.
    pub fn get_direct(&self, key: &str) -> Option<Token> {
        self.table.get(key)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Keys whose current value comes from `path`, sorted.
    pub fn keys_for_file(&self, path: &Path) -> Vec<String> {
        self.table.keys_for_file(&normalize_event_path(path))
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus::capture(&self.shared, self.table.len(), self.table.cache_hits())
    }
}

impl Drop for TranslationEngine {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::warn!("translation worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use tempfile::TempDir;

    use crate::config::WatchTiming;
    use crate::watcher::canonicalize_existing_path;

    fn fast_timing() -> WatchTiming {
        WatchTiming {
            dedup_window_ms: 10,
            debounce_ms: 50,
            retry_attempts: 3,
            retry_backoff_ms: 10,
        }
    }

    fn setup(files: &[(&str, &str)]) -> (TempDir, PathBuf, TranslationEngine) {
        let temp = TempDir::new().unwrap();
        let root = canonicalize_existing_path(temp.path().to_path_buf());
        for (name, text) in files {
            fs::write(root.join(name), text).unwrap();
        }
        let engine = TranslationEngine::new(EngineOptions::default()).unwrap();
        (temp, root, engine)
    }

    fn config(root: &Path) -> LookupConfig {
        LookupConfig::new(root).with_timing(fast_timing())
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    fn value(engine: &TranslationEngine, key: &str) -> Option<String> {
        engine.get_direct(key).map(|token| token.content)
    }

    #[test]
    fn load_reports_key_count() {
        let (_temp, root, engine) = setup(&[
            ("ui.csv", "Key,Value\nOK,Okay\nCANCEL,Cancel\n"),
            ("items.csv", "SWORD,Sword\n"),
            ("readme.txt", "NOT,loaded\n"),
        ]);
        let report = engine.load_directory(config(&root)).unwrap();

        assert_eq!(report.files_found, 2);
        assert_eq!(report.keys_loaded, 3);
        assert_eq!(engine.len(), 3);
        assert_eq!(engine.try_get("OK").unwrap().content, "Okay");
        assert!(engine.try_get("NOT").is_none());

        let status = engine.status();
        assert_eq!(status.state, EngineState::Ready);
        assert_eq!(status.directory, Some(root));
        assert_eq!(status.keys, 3);
    }

    #[test]
    fn empty_directory_is_not_fatal() {
        let (_temp, root, engine) = setup(&[]);
        let report = engine.load_directory(config(&root)).unwrap();
        assert!(report.is_empty_directory());
        assert!(engine.is_empty());
        assert_eq!(engine.status().state, EngineState::Ready);
    }

    #[test]
    fn invalid_config_keeps_previous_directory() {
        let (_temp, root, engine) = setup(&[("a.csv", "K,V\n")]);
        engine.load_directory(config(&root)).unwrap();

        let error = engine
            .load_directory(config(&root).with_delimiter('"'))
            .unwrap_err();
        assert!(matches!(error, LookupError::InvalidConfig(_)));
        let error = engine
            .load_directory(config(&root.join("missing")))
            .unwrap_err();
        assert!(matches!(error, LookupError::PathNotFound(_)));

        assert_eq!(engine.try_get("K").unwrap().content, "V");
        let status = engine.status();
        assert_eq!(status.state, EngineState::Ready);
        assert_eq!(status.directory, Some(root));
        assert!(status.last_error.is_some());
    }

    #[test]
    fn failed_first_load_reports_error_state() {
        let (_temp, root, engine) = setup(&[]);
        assert_eq!(engine.status().state, EngineState::Idle);

        let error = engine
            .load_directory(config(&root.join("missing")))
            .unwrap_err();
        assert!(matches!(error, LookupError::PathNotFound(_)));
        let status = engine.status();
        assert_eq!(status.state, EngineState::Error);
        assert!(status.last_error.is_some());
        assert!(engine.is_empty());
    }

    #[test]
    fn change_event_replaces_value() {
        let (_temp, root, engine) = setup(&[("a.csv", "K,V1\n")]);
        engine.load_directory(config(&root)).unwrap();
        assert_eq!(engine.try_get("K").unwrap().content, "V1");

        fs::write(root.join("a.csv"), "Key,Value\nK,V2\n").unwrap();
        engine.notify(FileEvent::changed(root.join("a.csv"))).unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            engine.try_get("K").is_some_and(|token| token.content == "V2")
        }));
        let token = engine.try_get("K").unwrap();
        assert_eq!(&*token.source_file, root.join("a.csv").as_path());
        assert_eq!(token.source_line, 2);
    }

    #[test]
    fn delete_event_removes_keys() {
        let (_temp, root, engine) = setup(&[("a.csv", "K,V\n"), ("b.csv", "L,W\n")]);
        engine.load_directory(config(&root)).unwrap();
        assert!(engine.try_get("K").is_some());

        fs::remove_file(root.join("a.csv")).unwrap();
        engine.notify(FileEvent::deleted(root.join("a.csv"))).unwrap();

        assert!(wait_until(Duration::from_secs(5), || engine.try_get("K").is_none()));
        assert_eq!(engine.try_get("L").unwrap().content, "W");
        assert!(engine.keys_for_file(&root.join("a.csv")).is_empty());
    }

    #[test]
    fn rename_event_moves_keys() {
        let (_temp, root, engine) = setup(&[("old.csv", "K,V\n")]);
        engine.load_directory(config(&root)).unwrap();

        fs::rename(root.join("old.csv"), root.join("new.csv")).unwrap();
        engine
            .notify(FileEvent::renamed(root.join("old.csv"), root.join("new.csv")))
            .unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            engine.keys_for_file(&root.join("new.csv")) == vec!["K".to_string()]
        }));
        assert!(engine.keys_for_file(&root.join("old.csv")).is_empty());
    }

    #[test]
    fn fallback_suffix_is_resolved_and_cached() {
        let (_temp, root, engine) = setup(&[("abilities.csv", "ABILITY_NAME_M,Defend\n")]);
        engine
            .load_directory(config(&root).with_fallback_suffixes(["_M", "_F"]))
            .unwrap();

        let token = engine.try_get("ABILITY_NAME").unwrap();
        assert_eq!(token.content, "Defend");
        assert_eq!(engine.status().cache_hits, 0);

        assert_eq!(engine.try_get("ABILITY_NAME").unwrap().content, "Defend");
        assert_eq!(engine.status().cache_hits, 1);
        assert!(engine.get_direct("ABILITY_NAME").is_none());
    }

    #[test]
    fn rapid_changes_reprocess_once() {
        let (_temp, root, engine) = setup(&[("a.csv", "K,V1\n")]);
        let timing = WatchTiming {
            dedup_window_ms: 0,
            debounce_ms: 300,
            ..fast_timing()
        };
        engine
            .load_directory(LookupConfig::new(&root).with_timing(timing))
            .unwrap();

        fs::write(root.join("a.csv"), "K,V2\n").unwrap();
        engine.notify(FileEvent::changed(root.join("a.csv"))).unwrap();
        fs::write(root.join("a.csv"), "K,V3\n").unwrap();
        engine.notify(FileEvent::changed(root.join("a.csv"))).unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            engine.status().reprocessed_files >= 1
        }));
        assert_eq!(value(&engine, "K").as_deref(), Some("V3"));
        thread::sleep(Duration::from_millis(400));
        assert_eq!(engine.status().reprocessed_files, 1);
    }

    #[test]
    fn last_row_without_newline_is_loaded() {
        let (_temp, root, engine) = setup(&[(
            "abilities.csv",
            "Key,Value\nABILITY_ATTACK,Attack\nABILITY_NAME,Defend",
        )]);
        engine.load_directory(config(&root)).unwrap();
        assert_eq!(engine.try_get("ABILITY_NAME").unwrap().content, "Defend");
    }

    #[test]
    fn quoted_multiline_value_is_loaded() {
        let (_temp, root, engine) = setup(&[(
            "dialog.csv",
            "GREETING,\"Hello,\nworld\"\nQUOTE,\"He said \"\"Hi\"\"\"\n",
        )]);
        engine.load_directory(config(&root)).unwrap();
        assert_eq!(engine.try_get("GREETING").unwrap().content, "Hello,\nworld");
        assert_eq!(engine.try_get("QUOTE").unwrap().content, "He said \"Hi\"");
    }

    #[test]
    fn filesystem_watch_picks_up_changes() {
        let (_temp, root, engine) = setup(&[("a.csv", "K,V1\n")]);
        engine.load_directory(config(&root)).unwrap();
        if !engine.status().watcher_enabled {
            return;
        }

        fs::write(root.join("a.csv"), "K,V2\n").unwrap();
        fs::write(root.join("b.csv"), "NEW,added\n").unwrap();

        assert!(wait_until(Duration::from_secs(10), || {
            value(&engine, "K").as_deref() == Some("V2")
                && value(&engine, "NEW").as_deref() == Some("added")
        }));
        assert!(engine.status().events_received > 0);
    }

    #[test]
    fn calls_after_worker_shutdown_fail_cleanly() {
        let (_temp, root, engine) = setup(&[]);
        let _ = engine.commands.send(Command::Shutdown);
        assert!(wait_until(Duration::from_secs(5), || {
            engine.load_directory(config(&root)).is_err()
        }));
        assert!(matches!(
            engine.notify(FileEvent::changed(root.join("a.csv"))),
            Err(LookupError::WorkerUnavailable)
        ));
    }
}
