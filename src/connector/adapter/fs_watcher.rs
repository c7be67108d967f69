use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use notify_debouncer_full::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, warn};

use crate::domain::{DomainError, FileEvent};

/// Debounced filesystem watcher feeding typed events into a tokio channel.
///
/// notify's callback runs on its own thread, so a std channel plus a bridge
/// thread does the blocking_send into the async side.
pub struct FileWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    pub fn new(
        event_tx: tokio_mpsc::Sender<FileEvent>,
        debounce: Duration,
    ) -> Result<Self, DomainError> {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            while let Ok(result) = rx.recv() {
                forward_debounced(result, &event_tx);
            }
        });

        let debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            let _ = tx.send(result);
        })
        .map_err(|e| DomainError::internal(format!("Failed to start watcher: {}", e)))?;

        Ok(Self { debouncer })
    }

    pub fn watch(&mut self, path: &Path) -> Result<(), DomainError> {
        debug!("Watching {}", path.display());
        self.debouncer
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| DomainError::internal(format!("Failed to watch {}: {}", path.display(), e)))
    }

    pub fn unwatch(&mut self, path: &Path) -> Result<(), DomainError> {
        debug!("Unwatching {}", path.display());
        self.debouncer
            .unwatch(path)
            .map_err(|e| DomainError::internal(format!("Failed to unwatch {}: {}", path.display(), e)))
    }
}

fn forward_debounced(result: DebounceEventResult, event_tx: &tokio_mpsc::Sender<FileEvent>) {
    match result {
        Ok(events) => {
            for event in events {
                if let Some(file_event) = convert_event(&event) {
                    // Bridge thread, so a blocking send is fine here.
                    if event_tx.blocking_send(file_event).is_err() {
                        warn!("Event channel closed");
                        break;
                    }
                }
            }
        }
        Err(errors) => {
            for error in errors {
                error!("Watch error: {error}");
            }
        }
    }
}

fn convert_event(event: &notify_debouncer_full::DebouncedEvent) -> Option<FileEvent> {
    use notify_debouncer_full::notify::EventKind;

    let path = event.paths.first()?.clone();

    // Hidden files and directories never reach the indexer.
    if path
        .file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
    {
        return None;
    }

    match &event.kind {
        EventKind::Create(_) => Some(FileEvent::created(path)),
        EventKind::Modify(_) => Some(FileEvent::modified(path)),
        EventKind::Remove(_) => Some(FileEvent::deleted(path)),
        _ => None,
    }
}
