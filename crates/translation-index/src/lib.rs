//! Translation lookup library.
//!
//! This crate loads delimiter-separated translation files from a directory
//! and keeps them queryable while they are edited:
//! - Row tokenizer for quoted, delimiter-separated text
//! - File processor splitting files into logical rows
//! - Concurrent key → value table with fallback suffixes and a resolved cache
//! - Background worker with a filesystem watch, debounce and retry

pub mod config;
pub mod engine;
pub mod error;
pub mod processor;
pub mod table;
pub mod tokenizer;
pub mod types;
pub mod watcher;

// Re-export main types
pub use config::{EngineOptions, LookupConfig, RetryPolicy, WatchTiming};
pub use engine::{EngineState, EngineStatus, LoadReport, LoadWarning, TranslationEngine};
pub use error::{LookupError, Result};
pub use processor::process_file;
pub use table::TranslationTable;
pub use tokenizer::tokenize;
pub use types::{Token, TokenKind, TokenizedRow};
pub use watcher::{FileEvent, FileEventKind};
