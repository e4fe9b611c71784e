//! File watcher feeding external edits into a store reload.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Watches the parent directory of one config file.
///
/// Only create, modify and rename-into events naming exactly the target
/// path are forwarded. Editors that save through a temp file and a rename
/// produce several events per save; the store's debounce absorbs them.
pub(crate) struct ConfigWatcher {
    watcher: RecommendedWatcher,
    dir: PathBuf,
    target: PathBuf,
}

impl ConfigWatcher {
    /// Start watching `target`, calling `on_change` from the watcher thread.
    pub(crate) fn start<F>(target: &Path, on_change: F) -> notify::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| notify::Error::generic("config path has no parent directory"))?;

        let wanted = target.to_path_buf();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if targets_file(&event, &wanted) {
                    debug!(kind = ?event.kind, path = %wanted.display(), "Config file event");
                    on_change();
                }
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        info!(path = %target.display(), "File watcher started");
        Ok(Self {
            watcher,
            dir,
            target: target.to_path_buf(),
        })
    }

    /// Stop watching. Events already queued may still be delivered.
    ///
    /// Dropping the watcher only signals its thread, so this is safe to call
    /// from inside a watcher callback.
    pub(crate) fn stop(self) {
        drop(self.watcher);
        info!(dir = %self.dir.display(), path = %self.target.display(), "File watcher stopped");
    }
}

/// Whether `event` may have changed the contents at `target`.
fn targets_file(event: &Event, target: &Path) -> bool {
    match event.kind {
        // Moved away from the target: nothing new to read.
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => false,
        // Paired rename: only the destination matters.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().is_some_and(|p| p == target)
        }
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any => {
            event.paths.iter().any(|p| p == target)
        }
        _ => false,
    }
}
