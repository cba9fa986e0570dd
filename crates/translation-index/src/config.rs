//! Configuration for loading and watching a translation directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LookupError, Result};

pub const DEFAULT_DELIMITER: char = ',';
pub const DEFAULT_QUOTE: char = '"';
pub const DEFAULT_EXTENSION: &str = "csv";

pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 50;
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

pub const DEFAULT_RESOLVED_CACHE_CAPACITY: u64 = 100_000;

/// The active configuration of a [`TranslationEngine`](crate::TranslationEngine).
///
/// Changing any field means calling `load_directory` again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Directory holding the translation files.
    pub directory: PathBuf,
    pub delimiter: char,
    pub quote: char,
    /// Suffixes tried, in order, when a key has no direct entry.
    pub fallback_suffixes: Vec<String>,
    /// File extensions to load, compared case-insensitively.
    pub extensions: Vec<String>,
    /// Whether subdirectories are loaded and watched.
    pub recursive: bool,
    pub timing: WatchTiming,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            delimiter: DEFAULT_DELIMITER,
            quote: DEFAULT_QUOTE,
            fallback_suffixes: Vec::new(),
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            recursive: false,
            timing: WatchTiming::default(),
        }
    }
}

impl LookupConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_fallback_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_timing(mut self, timing: WatchTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Checks the configuration before any engine state is touched.
    pub fn validate(&self) -> Result<()> {
        if self.delimiter == self.quote {
            return Err(LookupError::InvalidConfig(format!(
                "delimiter and quote must differ (both are {:?})",
                self.delimiter
            )));
        }
        if is_line_break(self.delimiter) {
            return Err(LookupError::InvalidConfig(
                "delimiter must not be a line break".to_string(),
            ));
        }
        if is_line_break(self.quote) {
            return Err(LookupError::InvalidConfig(
                "quote must not be a line break".to_string(),
            ));
        }
        if self.normalized_extensions().is_empty() {
            return Err(LookupError::InvalidConfig(
                "at least one file extension is required".to_string(),
            ));
        }
        if self.directory.as_os_str().is_empty() {
            return Err(LookupError::InvalidConfig(
                "directory must be set".to_string(),
            ));
        }

        let metadata = std::fs::metadata(&self.directory).map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                LookupError::PathNotFound(self.directory.clone())
            } else {
                LookupError::InvalidConfig(format!(
                    "unable to access directory {}: {error}",
                    self.directory.display()
                ))
            }
        })?;
        if !metadata.is_dir() {
            return Err(LookupError::InvalidConfig(format!(
                "not a directory: {}",
                self.directory.display()
            )));
        }
        Ok(())
    }

    /// Extensions without a leading dot, lowercased, empties removed.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|extension| extension.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|extension| !extension.is_empty())
            .collect()
    }

    /// Fallback suffixes in search order, skipping empty ones.
    pub fn suffixes(&self) -> Vec<String> {
        self.fallback_suffixes
            .iter()
            .filter(|suffix| !suffix.is_empty())
            .cloned()
            .collect()
    }

    /// Returns true if `path` has one of the configured extensions.
    pub fn matches_file(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|value| value.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|candidate| {
            candidate
                .trim()
                .trim_start_matches('.')
                .eq_ignore_ascii_case(extension)
        })
    }
}

fn is_line_break(ch: char) -> bool {
    matches!(ch, '\n' | '\r')
}

/// Timing of event handling after a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchTiming {
    /// Identical events for one path inside this window are dropped.
    pub dedup_window_ms: u64,
    /// Quiet period before a changed file is re-read.
    pub debounce_ms: u64,
    /// Read attempts for a file that is temporarily locked.
    pub retry_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
}

impl Default for WatchTiming {
    fn default() -> Self {
        Self {
            dedup_window_ms: DEFAULT_DEDUP_WINDOW_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl WatchTiming {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Bounded retry with linearly increasing backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after `failed_attempts` failures, or `None`
    /// once the attempts are used up.
    pub fn delay_after(&self, failed_attempts: u32) -> Option<Duration> {
        if failed_attempts == 0 || failed_attempts >= self.attempts {
            return None;
        }
        Some(self.backoff.saturating_mul(failed_attempts))
    }
}

/// Options fixed for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Upper bound on memoized lookups.
    pub resolved_cache_capacity: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            resolved_cache_capacity: DEFAULT_RESOLVED_CACHE_CAPACITY,
        }
    }
}
