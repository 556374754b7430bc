use crate::logging;
use anyhow::{bail, Context, Result};
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

/// Watches the config file and the assets it names. Parent directories are
/// watched so editors that save by rename are still seen.
pub struct ConfigWatcher {
    watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    directories: BTreeSet<PathBuf>,
    files: BTreeSet<PathBuf>,
}

impl ConfigWatcher {
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher
            .configure(
                NotifyConfig::default().with_compare_contents(false).with_poll_interval(Duration::from_millis(300)),
            )
            .context("configure config watcher")?;
        Ok(Self { watcher, rx, directories: BTreeSet::new(), files: BTreeSet::new() })
    }

    pub fn watch_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let normalized = normalize_watch_path(path.as_ref());
        let Some(directory) = normalized.parent().map(Path::to_path_buf) else {
            bail!("path '{}' has no parent directory", normalized.display());
        };
        if !directory.is_dir() {
            bail!("directory '{}' does not exist", directory.display());
        }
        if self.directories.insert(directory.clone()) {
            self.watcher
                .watch(&directory, RecursiveMode::NonRecursive)
                .with_context(|| format!("watch {}", directory.display()))?;
        }
        self.files.insert(normalized);
        Ok(())
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.files.contains(&normalize_watch_path(path))
    }

    /// Watched files touched since the last drain, deduplicated.
    pub fn drain_changes(&mut self) -> Vec<PathBuf> {
        let mut changed = BTreeSet::new();
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Ok(event) => {
                    if !Self::is_relevant(&event.kind) {
                        continue;
                    }
                    for path in event.paths {
                        let normalized = normalize_watch_path(&path);
                        if self.files.contains(&normalized) {
                            changed.insert(normalized);
                        }
                    }
                }
                Err(err) => log::warn!(target: logging::APP, "config watcher error: {err}"),
            }
        }
        changed.into_iter().collect()
    }

    fn is_relevant(kind: &EventKind) -> bool {
        matches!(
            kind,
            EventKind::Modify(ModifyKind::Data(_))
                | EventKind::Modify(ModifyKind::Name(_))
                | EventKind::Modify(ModifyKind::Any)
                | EventKind::Create(_)
                | EventKind::Remove(_)
        )
    }
}

fn normalize_watch_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else if let Ok(cwd) = env::current_dir() {
        cwd.join(path)
    } else {
        path.to_path_buf()
    };
    if let Ok(canonical) = fs::canonicalize(&absolute) {
        return canonical;
    }
    // Missing files (mid-rename) still map onto their canonical directory.
    match (absolute.parent().and_then(|parent| fs::canonicalize(parent).ok()), absolute.file_name()) {
        (Some(parent), Some(name)) => parent.join(name),
        _ => absolute,
    }
}
