//! Full directory loads.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use super::status::{EngineShared, EventCounters};
use crate::config::{LookupConfig, RetryPolicy};
use crate::error::Result;
use crate::processor::process_file;
use crate::table::TableContents;
use crate::types::TokenizedRow;

/// Reads and tokenizes one file; [`process_file`] outside of tests.
pub(crate) type FileReader = fn(&Path, char, char) -> Result<Vec<TokenizedRow>>;

/// Outcome of `load_directory`.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    /// The directory as loaded (canonicalized).
    pub directory: PathBuf,
    pub files_found: usize,
    pub files_loaded: usize,
    pub keys_loaded: usize,
    pub elapsed_ms: u64,
    pub warnings: Vec<LoadWarning>,
}

impl LoadReport {
    pub fn is_empty_directory(&self) -> bool {
        self.warnings
            .iter()
            .any(|warning| matches!(warning, LoadWarning::NoFilesFound))
    }

    pub fn failed_files(&self) -> impl Iterator<Item = &Path> {
        self.warnings.iter().filter_map(|warning| match warning {
            LoadWarning::FileFailed { path, .. } => Some(path.as_path()),
            _ => None,
        })
    }
}

/// Non-fatal problems found during a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadWarning {
    /// The directory holds no matching files; the watch is still enabled.
    NoFilesFound,
    /// A file could not be read after retrying.
    FileFailed { path: PathBuf, error: String },
    /// The watch could not be started; changes will not be picked up.
    WatchUnavailable { error: String },
}

/// Reads every file in `files` on the rayon pool and merges them in list
/// order, so a key defined in several files resolves to the last file.
pub(crate) fn load_contents(
    config: &LookupConfig,
    root: &Path,
    files: &[PathBuf],
    shared: &EngineShared,
) -> (TableContents, LoadReport) {
    let started = Instant::now();
    let policy = config.timing.retry_policy();

    let results: Vec<(&PathBuf, Result<Vec<TokenizedRow>>)> = files
        .par_iter()
        .map(|path| {
            shared.progress.start_file(path.clone());
            let result = process_file_with_retry(
                process_file,
                path,
                config.delimiter,
                config.quote,
                policy,
                shared,
            );
            shared.progress.finish_file();
            (path, result)
        })
        .collect();

    let mut contents = TableContents::new(config.suffixes());
    let mut warnings = Vec::new();
    let mut files_loaded = 0usize;

    for (path, result) in results {
        match result {
            Ok(rows) => {
                contents.merge_rows(&rows);
                files_loaded += 1;
            }
            Err(error) => {
                log::warn!(
                    "translation file skipped path={} error={}",
                    path.display(),
                    error
                );
                warnings.push(LoadWarning::FileFailed {
                    path: path.clone(),
                    error: error.to_string(),
                });
            }
        }
    }

    if files.is_empty() {
        warnings.push(LoadWarning::NoFilesFound);
    }

    let report = LoadReport {
        directory: root.to_path_buf(),
        files_found: files.len(),
        files_loaded,
        keys_loaded: contents.len(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        warnings,
    };
    (contents, report)
}

/// Reads a file, sleeping between attempts while it is locked.
pub(crate) fn process_file_with_retry(
    read: FileReader,
    path: &Path,
    delimiter: char,
    quote: char,
    policy: RetryPolicy,
    shared: &EngineShared,
) -> Result<Vec<TokenizedRow>> {
    let mut failed_attempts = 0u32;
    loop {
        match read(path, delimiter, quote) {
            Ok(rows) => return Ok(rows),
            Err(error) if error.is_retryable() => {
                failed_attempts += 1;
                let Some(delay) = policy.delay_after(failed_attempts) else {
                    EventCounters::bump(&shared.counters.retries_exhausted);
                    return Err(error);
                };
                EventCounters::bump(&shared.counters.retries);
                log::debug!(
                    "translation file locked, retrying path={} attempt={} delay_ms={}",
                    path.display(),
                    failed_attempts,
                    delay.as_millis()
                );
                thread::sleep(delay);
            }
            Err(error) => return Err(error),
        }
    }
}
