//! File watcher - Forwards filesystem notifications to the host loop
//!
//! notify calls back on its own thread; events are converted to
//! [`ChangeEvent`]s and pushed into a tokio channel that the host drains
//! between iterations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::value_objects::{ChangeEvent, ChangeKind};

/// Window in which repeated `modified` events for one path collapse into one
pub const COALESCE_WINDOW: Duration = Duration::from_secs(1);

/// Keeps the notify watcher alive; dropping it stops the notifications
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch every path (directories recursively, files through their parent)
    /// and return the receiving end of the event channel
    pub fn start(paths: &[PathBuf]) -> Result<(Self, mpsc::UnboundedReceiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in convert(&event) {
                    if tx.send(change).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        })
        .context("Failed to initialize file watcher")?;

        for path in paths {
            let (target, mode) = if path.is_dir() {
                (path.as_path(), RecursiveMode::Recursive)
            } else {
                match path.parent().filter(|p| p.is_dir()) {
                    Some(parent) => (parent, RecursiveMode::NonRecursive),
                    None => {
                        warn!(path = %path.display(), "Not watching missing path");
                        continue;
                    }
                }
            };
            watcher
                .watch(target, mode)
                .with_context(|| format!("Failed to watch {}", target.display()))?;
            debug!(path = %target.display(), "Watching");
        }

        Ok((Self { _watcher: watcher }, rx))
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        _ => None,
    }
}

fn convert(event: &Event) -> Vec<ChangeEvent> {
    let Some(kind) = change_kind(&event.kind) else {
        return Vec::new();
    };
    event
        .paths
        .iter()
        .map(|path| ChangeEvent::new(path.clone(), kind))
        .collect()
}

/// Drops `modified` events that repeat within [`COALESCE_WINDOW`] for the
/// same path. Created and deleted events always pass.
#[derive(Debug, Default)]
pub struct ModifiedCoalescer {
    last_seen: HashMap<PathBuf, Instant>,
}

impl ModifiedCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, event: &ChangeEvent) -> bool {
        self.accept_at(event, Instant::now())
    }

    fn accept_at(&mut self, event: &ChangeEvent, now: Instant) -> bool {
        if event.kind != ChangeKind::Modified {
            self.last_seen.remove(&event.path);
            return true;
        }

        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) < COALESCE_WINDOW);
        if self.last_seen.contains_key(&event.path) {
            return false;
        }
        self.last_seen.insert(event.path.clone(), now);
        true
    }

    #[cfg(test)]
    fn is_tracking(&self, path: &std::path::Path) -> bool {
        self.last_seen.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    #[test]
    fn test_event_kinds() {
        assert_eq!(change_kind(&EventKind::Create(CreateKind::File)), Some(ChangeKind::Created));
        assert_eq!(change_kind(&EventKind::Remove(RemoveKind::File)), Some(ChangeKind::Deleted));
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Modified)
        );
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Some(ChangeKind::Deleted)
        );
        assert_eq!(change_kind(&EventKind::Any), None);
    }

    #[test]
    fn test_convert_fans_out_paths() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/a.yml"))
            .add_path(PathBuf::from("/b.yml"));
        let changes = convert(&event);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1], ChangeEvent::new("/b.yml", ChangeKind::Created));
    }

    #[test]
    fn test_coalesce_modified_within_window() {
        let mut coalescer = ModifiedCoalescer::new();
        let start = Instant::now();
        let modified = ChangeEvent::new("/data/pony/WeightLora.yml", ChangeKind::Modified);

        assert!(coalescer.accept_at(&modified, start));
        assert!(!coalescer.accept_at(&modified, start + Duration::from_millis(300)));
        assert!(coalescer.accept_at(&modified, start + Duration::from_millis(1500)));

        let other = ChangeEvent::new("/data/pony/WeightChar.yml", ChangeKind::Modified);
        assert!(coalescer.accept_at(&other, start + Duration::from_millis(1600)));
    }

    #[test]
    fn test_created_and_deleted_always_pass() {
        let mut coalescer = ModifiedCoalescer::new();
        let now = Instant::now();
        let path = "/models/pony/m1.safetensors";

        assert!(coalescer.accept_at(&ChangeEvent::new(path, ChangeKind::Modified), now));
        assert!(coalescer.accept_at(&ChangeEvent::new(path, ChangeKind::Deleted), now));
        assert!(!coalescer.is_tracking(std::path::Path::new(path)));
        assert!(coalescer.accept_at(&ChangeEvent::new(path, ChangeKind::Created), now));
    }
}
