//! Mapping file watcher for hot-reload support
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by writing a temporary file and renaming it over the mapping
//! keep triggering reloads. Bursts of events for one save collapse into a
//! single reload, and a reload that changes nothing is not forwarded.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::mapping::{MappingError, MappingTable};

/// Time given to the writer to finish before the file is read back
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Watches a mapping file and yields freshly loaded tables
pub struct MappingWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Arc<MappingTable>>,
}

/// State shared between the notify thread and reload tasks
struct Reloader {
    path: PathBuf,
    file_name: OsString,
    current: Mutex<Arc<MappingTable>>,
    pending: AtomicBool,
    tx: mpsc::Sender<Arc<MappingTable>>,
}

impl Reloader {
    fn is_relevant(&self, event: &Event) -> bool {
        matches!(
            event.kind,
            EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
        ) && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(self.file_name.as_os_str()))
    }

    async fn reload(&self) {
        tokio::time::sleep(SETTLE_DELAY).await;
        // events from here on belong to a newer write
        self.pending.store(false, Ordering::Release);

        let table = match MappingTable::load(&self.path).await {
            Ok(table) => table,
            Err(MappingError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                debug!(
                    "Mapping file {} is gone, keeping the current mapping",
                    self.path.display()
                );
                return;
            }
            Err(e) => {
                warn!("Failed to reload mapping (keeping old one): {}", e);
                return;
            }
        };

        let diff = self.current.lock().diff(&table);
        if diff.is_empty() {
            debug!("Mapping file touched without changes");
            return;
        }
        info!("Mapping changed: {}", diff);

        let table = Arc::new(table);
        *self.current.lock() = Arc::clone(&table);
        if self.tx.send(table).await.is_err() {
            debug!("Mapping watcher closed, dropping update");
        }
    }
}

impl MappingWatcher {
    /// Load the mapping file and start watching it
    pub async fn new(path: impl Into<PathBuf>) -> Result<(Self, Arc<MappingTable>)> {
        let path = path.into();
        let (tx, rx) = mpsc::channel(10);

        let file_name = path
            .file_name()
            .with_context(|| format!("Mapping path has no file name: {}", path.display()))?
            .to_os_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let initial = MappingTable::load(&path)
            .await
            .context("Failed to load initial mapping")?;
        let initial = Arc::new(initial);

        let reloader = Arc::new(Reloader {
            path: path.clone(),
            file_name,
            current: Mutex::new(Arc::clone(&initial)),
            pending: AtomicBool::new(false),
            tx,
        });

        // notify callbacks run on their own OS thread
        let runtime_handle = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !reloader.is_relevant(&event) {
                        return;
                    }
                    if reloader.pending.swap(true, Ordering::AcqRel) {
                        trace!("Reload already pending: {:?}", event.kind);
                        return;
                    }
                    debug!("Mapping file event {:?}: {:?}", event.kind, event.paths);

                    let reloader = Arc::clone(&reloader);
                    runtime_handle.spawn(async move { reloader.reload().await });
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(Path::new(&dir), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch mapping directory: {}", dir.display()))?;

        info!("Mapping file watcher started for: {}", path.display());

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            initial,
        ))
    }

    /// Wait for the next changed mapping
    /// Returns None if the watcher has been closed
    pub async fn next_table(&mut self) -> Option<Arc<MappingTable>> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const ONE_CONTROL: &str = r#"
controls:
  - { group: "[Channel1]", item: jog, status: 0xB0, control: 0x10, options: [rot64] }
"#;

    const TWO_CONTROLS: &str = r#"
controls:
  - { group: "[Channel1]", item: jog, status: 0xB0, control: 0x10, options: [rot64] }
  - { group: "[Channel2]", item: jog, status: 0xB1, control: 0x10, options: [rot64] }
"#;

    async fn next(watcher: &mut MappingWatcher) -> Arc<MappingTable> {
        tokio::time::timeout(Duration::from_secs(2), watcher.next_table())
            .await
            .expect("no reload within 2s")
            .expect("watcher closed")
    }

    #[tokio::test]
    async fn test_mapping_watcher_reloads() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("deck.yaml");
        fs::write(&path, ONE_CONTROL)?;

        let (mut watcher, table) = MappingWatcher::new(&path).await?;
        assert_eq!(table.len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&path, TWO_CONTROLS)?;

        let table = next(&mut watcher).await;
        assert_eq!(table.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_reload_after_rename_over_mapping() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("deck.yaml");
        fs::write(&path, ONE_CONTROL)?;

        let (mut watcher, _) = MappingWatcher::new(&path).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let staged = temp_dir.path().join(".deck.yaml.swp");
        fs::write(&staged, TWO_CONTROLS)?;
        fs::rename(&staged, &path)?;

        let table = next(&mut watcher).await;
        assert_eq!(table.len(), 2);

        // the original file is gone; later writes must still be seen
        tokio::time::sleep(Duration::from_millis(300)).await;
        fs::write(&path, ONE_CONTROL)?;
        let table = next(&mut watcher).await;
        assert_eq!(table.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unchanged_rewrite_is_not_forwarded() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("deck.yaml");
        fs::write(&path, ONE_CONTROL)?;

        let (mut watcher, _) = MappingWatcher::new(&path).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&path, ONE_CONTROL)?;
        // unrelated files in the same directory are ignored too
        fs::write(temp_dir.path().join("other.yaml"), TWO_CONTROLS)?;

        let update =
            tokio::time::timeout(Duration::from_millis(600), watcher.next_table()).await;
        assert!(update.is_err(), "unexpected reload");
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_rewrite_keeps_watching() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("deck.yaml");
        fs::write(&path, ONE_CONTROL)?;

        let (mut watcher, _) = MappingWatcher::new(&path).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&path, "settings:\n  takeover_threshold: -1.0\n")?;
        tokio::time::sleep(Duration::from_millis(300)).await;
        fs::write(&path, TWO_CONTROLS)?;

        let table = next(&mut watcher).await;
        assert_eq!(table.len(), 2);
        Ok(())
    }
}
