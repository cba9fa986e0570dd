//! notify watcher for the translation directory.
//!
//! Watcher callbacks send events through a crossbeam channel instead of
//! touching the lookup table. The engine worker is the sole consumer.

use std::path::{Path, PathBuf};

use crossbeam_channel::{unbounded, Receiver, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::FileEvent;
use crate::error::{LookupError, Result};

/// An event sent from the watcher to the engine worker.
#[derive(Debug)]
pub enum WatcherEvent {
    /// File-level changes to apply.
    Changes(Vec<FileEvent>),
    /// Events were dropped by the OS; the whole directory must be reloaded.
    RescanRequired,
    /// The watcher reported an error.
    Error(String),
}

/// Starts watching `root` and returns the watcher with its event channel.
///
/// Dropping the watcher stops the watch and disconnects the channel.
pub fn create_directory_watcher(
    root: &Path,
    recursive: bool,
) -> Result<(RecommendedWatcher, Receiver<WatcherEvent>)> {
    let (event_tx, event_rx) = unbounded();
    let mut watcher = recommended_watcher(move |event_result: notify::Result<Event>| {
        forward_event(&event_tx, event_result);
    })
    .map_err(|error| {
        LookupError::Watch(format!(
            "failed to create filesystem watcher for {}: {error}",
            root.display()
        ))
    })?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher.watch(root, mode).map_err(|error| {
        LookupError::Watch(format!("failed to watch {}: {error}", root.display()))
    })?;

    Ok((watcher, event_rx))
}

fn forward_event(event_tx: &Sender<WatcherEvent>, event_result: notify::Result<Event>) {
    let message = match event_result {
        Ok(event) if event.need_rescan() => WatcherEvent::RescanRequired,
        Ok(event) => {
            let changes = file_events_from_notify(event);
            if changes.is_empty() {
                return;
            }
            WatcherEvent::Changes(changes)
        }
        Err(error) => WatcherEvent::Error(error.to_string()),
    };
    // The receiver is gone once the engine replaced or dropped this watcher.
    let _ = event_tx.send(message);
}

/// Maps a notify event to file events.
///
/// Access events are ignored. A rename reported as a single event with both
/// paths becomes a rename; halves of a rename become a delete (`From`) or a
/// create (`To`). Events whose kind is unknown are treated as changes; the
/// worker checks whether the file still exists when it reprocesses it.
pub fn file_events_from_notify(event: Event) -> Vec<FileEvent> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Create(_) => paths.into_iter().map(FileEvent::created).collect(),
        EventKind::Remove(_) => paths.into_iter().map(FileEvent::deleted).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => rename_events(mode, paths),
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => {
            paths.into_iter().map(FileEvent::changed).collect()
        }
    }
}

fn rename_events(mode: RenameMode, paths: Vec<PathBuf>) -> Vec<FileEvent> {
    match mode {
        RenameMode::Both if paths.len() == 2 => {
            let mut paths = paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![FileEvent::renamed(from, to)],
                _ => Vec::new(),
            }
        }
        RenameMode::From => paths.into_iter().map(FileEvent::deleted).collect(),
        RenameMode::To => paths.into_iter().map(FileEvent::created).collect(),
        _ => paths
            .into_iter()
            .map(|path| {
                if path.exists() {
                    FileEvent::changed(path)
                } else {
                    FileEvent::deleted(path)
                }
            })
            .collect(),
    }
}
