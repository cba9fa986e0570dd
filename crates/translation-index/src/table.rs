//! The live key → value table and its resolved-lookup cache.
//!
//! Concurrency contract: one writer (the engine worker) and any number of
//! readers. Every mutation runs under the write lock and invalidates the
//! affected cache entries before the lock is released. Readers fill the cache
//! while holding the read lock, so a stale resolution can never be inserted
//! after a writer has moved on. Purging and repopulating one file is therefore
//! atomic for readers.

mod resolved;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::RwLock;

use crate::types::{Token, TokenizedRow};

pub use resolved::ResolvedCache;

/// Entries, their owning files and the fallback suffixes of one configuration.
#[derive(Debug, Default)]
pub struct TableContents {
    entries: FnvHashMap<String, Token>,
    keys_by_file: FnvHashMap<Arc<Path>, FnvHashSet<String>>,
    suffixes: Vec<String>,
}

impl TableContents {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self {
            suffixes,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts the entries of `rows` in row order. Later rows win.
    ///
    /// Returns the inserted keys.
    pub fn merge_rows(&mut self, rows: &[TokenizedRow]) -> Vec<String> {
        let mut inserted = Vec::new();
        for row in rows {
            if let Some((key, value)) = row.entry() {
                self.insert(key.to_string(), value.clone());
                inserted.push(key.to_string());
            }
        }
        inserted
    }

    fn insert(&mut self, key: String, value: Token) {
        if let Some(previous) = self.entries.get(&key) {
            if previous.source_file != value.source_file {
                let owner = previous.source_file.clone();
                if let Some(keys) = self.keys_by_file.get_mut(&owner) {
                    keys.remove(&key);
                    if keys.is_empty() {
                        self.keys_by_file.remove(&owner);
                    }
                }
            }
        }
        self.keys_by_file
            .entry(value.source_file.clone())
            .or_default()
            .insert(key.clone());
        self.entries.insert(key, value);
    }

    /// Removes every entry whose value came from `path`.
    ///
    /// Returns the removed keys.
    pub fn purge_file(&mut self, path: &Path) -> Vec<String> {
        let Some(keys) = self.keys_by_file.remove(path) else {
            return Vec::new();
        };
        keys.into_iter()
            .inspect(|key| {
                self.entries.remove(key);
            })
            .collect()
    }

    fn lookup(&self, key: &str) -> Option<&Token> {
        if let Some(token) = self.entries.get(key) {
            return Some(token);
        }
        let mut candidate = String::with_capacity(key.len() + 8);
        self.suffixes.iter().find_map(|suffix| {
            candidate.clear();
            candidate.push_str(key);
            candidate.push_str(suffix);
            self.entries.get(candidate.as_str())
        })
    }
}

/// Summary of one per-file update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpdate {
    pub removed: usize,
    pub inserted: usize,
}

/// The shared lookup table.
#[derive(Debug)]
pub struct TranslationTable {
    contents: RwLock<TableContents>,
    resolved: ResolvedCache,
}

impl TranslationTable {
    pub fn new(resolved_cache_capacity: u64) -> Self {
        Self {
            contents: RwLock::new(TableContents::default()),
            resolved: ResolvedCache::new(resolved_cache_capacity),
        }
    }

    /// Resolves `key` through the cache, the live map and the fallback
    /// suffixes, memoizing the outcome under `key`.
    pub fn resolve(&self, key: &str) -> Option<Token> {
        if let Some(outcome) = self.resolved.get(key) {
            return outcome;
        }

        let contents = self.contents.read();
        let outcome = contents.lookup(key).cloned();
        self.resolved.insert(key, outcome.clone());
        outcome
    }

    /// Direct live-map lookup, bypassing suffixes and the cache.
    pub fn get(&self, key: &str) -> Option<Token> {
        self.contents.read().entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.contents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.read().is_empty()
    }

    /// Keys currently owned by `path`, sorted.
    pub fn keys_for_file(&self, path: &Path) -> Vec<String> {
        let contents = self.contents.read();
        let mut keys: Vec<String> = contents
            .keys_by_file
            .get(path)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Loaded files located below `directory`, sorted.
    pub fn files_under(&self, directory: &Path) -> Vec<PathBuf> {
        let contents = self.contents.read();
        let mut files: Vec<PathBuf> = contents
            .keys_by_file
            .keys()
            .filter(|file| {
                let file: &Path = file;
                file != directory && file.starts_with(directory)
            })
            .map(|file| file.to_path_buf())
            .collect();
        files.sort();
        files
    }

    /// Swaps in freshly loaded contents and clears the cache.
    pub fn replace(&self, next: TableContents) -> usize {
        let mut contents = self.contents.write();
        *contents = next;
        self.resolved.clear();
        contents.len()
    }

    /// Clears all entries and the cache, keeping the current suffixes.
    pub fn clear(&self) {
        let mut contents = self.contents.write();
        let suffixes = std::mem::take(&mut contents.suffixes);
        *contents = TableContents::new(suffixes);
        self.resolved.clear();
    }

    /// Purges the entries of every path in `purge`, then merges `rows`.
    ///
    /// Both steps happen under one write lock. Only the cached outcomes of
    /// keys touched by the update are invalidated, so the lock is held for
    /// time proportional to the update, not to the cache size.
    pub fn update_files(&self, purge: &[&Path], rows: &[TokenizedRow]) -> FileUpdate {
        let mut contents = self.contents.write();
        let removed: Vec<String> = purge
            .iter()
            .flat_map(|path| contents.purge_file(path))
            .collect();
        let inserted = contents.merge_rows(rows);
        self.resolved
            .invalidate_touched(removed.iter().chain(&inserted), &contents.suffixes);
        FileUpdate {
            removed: removed.len(),
            inserted: inserted.len(),
        }
    }

    pub fn cache_hits(&self) -> u64 {
        self.resolved.hits()
    }
}
