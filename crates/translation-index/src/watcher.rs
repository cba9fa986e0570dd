//! Filesystem watching for the translation directory.
//!
//! - notify watcher whose callback only forwards events into a channel
//! - mapping of notify events to create/change/delete/rename file events
//! - scope checks and directory enumeration

mod events;
mod scope;

pub use events::{create_directory_watcher, file_events_from_notify, WatcherEvent};
pub use scope::{canonicalize_existing_path, list_translation_files, normalize_event_path, path_in_scope};

use std::path::PathBuf;

use serde::Serialize;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEventKind {
    Created,
    Changed,
    Deleted,
    Renamed,
}

impl FileEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Changed => "changed",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
        }
    }
}

/// A file-system notification for one translation file.
///
/// `old_path` is only set for renames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
    pub old_path: Option<PathBuf>,
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::simple(FileEventKind::Created, path.into())
    }

    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self::simple(FileEventKind::Changed, path.into())
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::simple(FileEventKind::Deleted, path.into())
    }

    pub fn renamed(old_path: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FileEventKind::Renamed,
            path: path.into(),
            old_path: Some(old_path.into()),
        }
    }

    fn simple(kind: FileEventKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            old_path: None,
        }
    }
}
