//! Long-running watch loop.
//!
//! File events from `notify` are debounced per path and routed to the
//! engine's incremental handlers. A timer drives fetch followed by sync.
//! An exclusive lock on `.cardsync/watch.lock` keeps one watcher per vault.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::{SyncEngine, SyncStatus};
use crate::error::{Error, Result};
use crate::lock::FileLock;
use crate::vault::Vault;

/// Lock file guarding a vault against concurrent watchers.
pub const WATCH_LOCK: &str = ".cardsync/watch.lock";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    Created(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    Modified(PathBuf),
    Removed(PathBuf),
}

impl LocalEvent {
    pub fn path(&self) -> &Path {
        match self {
            LocalEvent::Created(path) | LocalEvent::Modified(path) | LocalEvent::Removed(path) => {
                path
            }
            LocalEvent::Renamed { to, .. } => to,
        }
    }

    fn map_paths(self, map: impl Fn(&Path) -> Option<PathBuf>) -> Option<LocalEvent> {
        Some(match self {
            LocalEvent::Created(path) => LocalEvent::Created(map(&path)?),
            LocalEvent::Modified(path) => LocalEvent::Modified(map(&path)?),
            LocalEvent::Removed(path) => LocalEvent::Removed(map(&path)?),
            LocalEvent::Renamed { from, to } => match (map(&from), map(&to)) {
                (Some(from), Some(to)) => LocalEvent::Renamed { from, to },
                (None, Some(to)) => LocalEvent::Created(to),
                (Some(from), None) => LocalEvent::Removed(from),
                (None, None) => return None,
            },
        })
    }
}

/// Translate a raw notify event into card events.
pub fn classify(event: &Event) -> Vec<LocalEvent> {
    let each = |make: fn(PathBuf) -> LocalEvent| -> Vec<LocalEvent> {
        event.paths.iter().cloned().map(make).collect()
    };
    match event.kind {
        EventKind::Create(_) => each(LocalEvent::Created),
        EventKind::Remove(_) => each(LocalEvent::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            vec![LocalEvent::Renamed {
                from: event.paths[0].clone(),
                to: event.paths[1].clone(),
            }]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(LocalEvent::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(LocalEvent::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => each(LocalEvent::Modified),
        _ => Vec::new(),
    }
}

/// Collapses bursts of events on one path into a single event.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: BTreeMap<PathBuf, (Instant, LocalEvent)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, event: LocalEvent, now: Instant) {
        let key = event.path().to_path_buf();
        let merged = match (self.pending.remove(&key).map(|(_, queued)| queued), event) {
            (Some(LocalEvent::Created(_)), LocalEvent::Modified(path)) => LocalEvent::Created(path),
            (Some(renamed @ LocalEvent::Renamed { .. }), LocalEvent::Modified(_)) => renamed,
            (_, event) => event,
        };
        self.pending.insert(key, (now + self.window, merged));
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(deadline, _)| *deadline).min()
    }

    /// Remove and return every event whose window has closed.
    pub fn due(&mut self, now: Instant) -> Vec<LocalEvent> {
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        ready
            .into_iter()
            .filter_map(|path| self.pending.remove(&path).map(|(_, event)| event))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub debounce: Duration,
    pub fetch_interval: Duration,
    pub sync_enabled: bool,
}

impl WatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: Duration::from_millis(config.sync.watch_debounce_ms),
            fetch_interval: Duration::from_millis(config.sync.fetch_interval_ms),
            sync_enabled: config.sync.enabled,
        }
    }
}

async fn dispatch(engine: &SyncEngine, event: LocalEvent) {
    let outcome = match &event {
        LocalEvent::Created(path) => engine.on_local_create(path).await,
        LocalEvent::Modified(path) => engine.on_local_modify(path).await,
        LocalEvent::Removed(path) => engine.on_local_delete(path).await,
        LocalEvent::Renamed { from, to } => engine.on_local_rename(to, from).await,
    };
    match outcome {
        Ok(status) => debug!(?event, %status, "handled file event"),
        Err(err) => warn!(?event, error = %err, "file event failed"),
    }
}

async fn fetch_and_sync(engine: &SyncEngine) {
    match engine.fetch_delta().await {
        Ok(SyncStatus::Synced) => debug!("nothing to sync"),
        Ok(SyncStatus::Error) => {
            let reason = engine.last_fetch_error().await.unwrap_or_default();
            warn!(%reason, "fetch failed, skipping sync");
        }
        Ok(status) => {
            info!(%status, "applying pending changes");
            if let Err(err) = engine.sync_task_lists_and_tasks().await {
                error!(error = %err, "sync failed");
            }
        }
        Err(err) => error!(error = %err, "fetch failed"),
    }
}

/// Watch `vault` until `shutdown` resolves.
pub async fn run(
    engine: Arc<SyncEngine>,
    vault: &Vault,
    options: WatchOptions,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let lock_path = vault.root().join(WATCH_LOCK);
    let _lock = FileLock::try_acquire(&lock_path)?.ok_or_else(|| Error::LockFailed(lock_path.clone()))?;

    let tracked = engine.load_tracked_documents().await?;
    info!(root = %vault.root().display(), tracked, "watching vault");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;
    watcher.watch(vault.root(), RecursiveMode::Recursive)?;

    let mut debouncer = Debouncer::new(options.debounce);
    let mut ticker = tokio::time::interval(options.fetch_interval);
    tokio::pin!(shutdown);

    loop {
        let deadline = debouncer.next_deadline();
        tokio::select! {
            _ = &mut shutdown => {
                info!("watch stopped");
                break;
            }
            received = rx.recv() => {
                match received {
                    Some(Ok(event)) => {
                        for local in classify(&event) {
                            if let Some(local) = local.map_paths(|path| vault.relative(path)) {
                                debouncer.push(local, Instant::now());
                            }
                        }
                    }
                    Some(Err(err)) => warn!(error = %err, "watcher error"),
                    None => break,
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                for event in debouncer.due(Instant::now()) {
                    dispatch(&engine, event).await;
                }
            }
            _ = ticker.tick(), if options.sync_enabled => {
                fetch_and_sync(&engine).await;
            }
        }
    }
    Ok(())
}
