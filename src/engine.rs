//! Reconciliation orchestrator.
//!
//! `SyncEngine` owns the known deltas for collections and items, fetches
//! both sides to grow them, applies them on sync, and folds local file
//! events into them between fetches. Every state-changing operation runs as
//! a job on the engine's [`JobQueue`], so at most one of them is in flight.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::codec;
use crate::collection::TaskCollection;
use crate::config::Config;
use crate::delta::{Delta, DeltaCounts, OriginDelta, RemoteDelta};
use crate::error::{Error, Result};
use crate::queue::{JobKind, JobQueue};
use crate::remote::{self, RemoteList, RemoteService, RemoteTask};
use crate::reorder::reorder_document;
use crate::resolver::{
    compute_collection_deltas, compute_item_deltas, compute_item_deltas_with_groups, Reconcilable,
};
use crate::task::TaskItem;
use crate::throttle::Throttler;
use crate::vault::LocalStore;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub job_poll: Duration,
    pub max_calls_per_sec: u32,
    pub time_zone: String,
    pub reorder_on_write: bool,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            job_poll: Duration::from_millis(config.sync.job_poll_ms),
            max_calls_per_sec: config.remote.max_calls_per_sec,
            time_zone: config.remote.time_zone.clone(),
            reorder_on_write: config.sync.reorder_on_write,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Summary shown after every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Pending { to_origin: usize, to_remote: usize },
    /// The last fetch failed; nothing will be applied until one succeeds.
    Error,
}

impl SyncStatus {
    fn from_counts(counts: DeltaCounts) -> Self {
        if counts.is_empty() {
            SyncStatus::Synced
        } else {
            SyncStatus::Pending {
                to_origin: counts.to_origin,
                to_remote: counts.to_remote,
            }
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Synced => f.write_str("synced"),
            SyncStatus::Pending {
                to_origin,
                to_remote,
            } => write!(f, "↓{to_origin} ↑{to_remote}"),
            SyncStatus::Error => f.write_str("error"),
        }
    }
}

/// What a sync pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Known deltas, as exposed to callers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PendingChanges {
    pub collections: Delta<TaskCollection>,
    pub items: Delta<TaskItem>,
}

#[derive(Debug, Default)]
struct EngineState {
    collections: Delta<TaskCollection>,
    items: Delta<TaskItem>,
    last_fetch_failed: bool,
    last_fetch_error: Option<String>,
    tracked: BTreeSet<PathBuf>,
    /// Last parsed snapshot of each tracked document.
    cache: BTreeMap<PathBuf, TaskCollection>,
}

impl EngineState {
    fn status(&self) -> SyncStatus {
        if self.last_fetch_failed {
            return SyncStatus::Error;
        }
        SyncStatus::from_counts(DeltaCounts::of(&self.collections) + DeltaCounts::of(&self.items))
    }

    fn pending_collection_add(&self, path: &Path) -> Option<usize> {
        self.collections
            .to_remote
            .add
            .iter()
            .position(|collection| collection.path.as_deref() == Some(path))
    }

    fn knows(&self, path: &Path) -> bool {
        self.tracked.contains(path)
            || self.cache.contains_key(path)
            || self.pending_collection_add(path).is_some()
    }

    /// Drop every pending item change that belongs to the document at
    /// `path` or to the remote list `list_id`.
    fn forget_items_of(&mut self, path: &Path, list_id: Option<&str>) {
        let belongs = |item: &TaskItem| {
            item.parent.path.as_deref() == Some(path)
                || (list_id.is_some() && item.parent.id.as_deref() == list_id)
        };
        let Delta {
            to_origin,
            to_remote,
        } = &mut self.items;
        for bucket in [
            &mut to_origin.add,
            &mut to_origin.modify,
            &mut to_origin.remove_id,
            &mut to_remote.add,
            &mut to_remote.modify,
            &mut to_remote.delete,
        ] {
            bucket.retain(|item| !belongs(item));
        }
    }
}

/// Where documents and remote lists ended up during one sync pass.
#[derive(Debug, Default)]
struct Links {
    list_by_path: HashMap<PathBuf, String>,
    path_by_list: HashMap<String, PathBuf>,
}

impl Links {
    fn from_cache(cache: &BTreeMap<PathBuf, TaskCollection>) -> Self {
        let mut links = Self::default();
        for (path, collection) in cache {
            if let Some(id) = &collection.id {
                links.link(path.clone(), id.clone());
            }
        }
        links
    }

    fn link(&mut self, path: PathBuf, list_id: String) {
        self.list_by_path.insert(path.clone(), list_id.clone());
        self.path_by_list.insert(list_id, path);
    }

    fn list_for(&self, item: &TaskItem) -> Option<String> {
        item.parent.id.clone().or_else(|| {
            item.parent
                .path
                .as_ref()
                .and_then(|path| self.list_by_path.get(path).cloned())
        })
    }

    fn path_for(&self, item: &TaskItem) -> Option<PathBuf> {
        item.parent
            .id
            .as_ref()
            .and_then(|id| self.path_by_list.get(id).cloned())
            .or_else(|| item.parent.path.clone())
    }
}

enum Applied {
    Done,
    Skipped,
}

pub struct SyncEngine {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteService>,
    settings: EngineSettings,
    throttle: Throttler,
    jobs: JobQueue,
    state: Mutex<EngineState>,
}

impl SyncEngine {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteService>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            local,
            remote,
            throttle: Throttler::new(settings.max_calls_per_sec),
            settings,
            jobs: JobQueue::new(),
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn jobs(&self) -> &JobQueue {
        &self.jobs
    }

    pub async fn status(&self) -> SyncStatus {
        self.state.lock().await.status()
    }

    pub async fn last_fetch_error(&self) -> Option<String> {
        self.state.lock().await.last_fetch_error.clone()
    }

    pub async fn pending(&self) -> PendingChanges {
        let state = self.state.lock().await;
        PendingChanges {
            collections: state.collections.clone(),
            items: state.items.clone(),
        }
    }

    pub async fn reset_known_deltas(&self) {
        let mut state = self.state.lock().await;
        state.collections = Delta::new();
        state.items = Delta::new();
        info!("known deltas reset");
    }

    /// List and parse every tracked document. Returns how many there are.
    pub async fn load_tracked_documents(&self) -> Result<usize> {
        let _job = self.jobs.acquire(JobKind::Fetch, self.settings.job_poll).await;
        let mut state = self.state.lock().await;
        self.refresh_snapshot(&mut state).await?;
        Ok(state.tracked.len())
    }

    /// Compare both sides and grow the known deltas.
    ///
    /// A failure to read either side is recorded and reported as
    /// [`SyncStatus::Error`]; the known deltas are left as they were. A known
    /// delta that no longer matches the snapshots is returned as an error.
    pub async fn fetch_delta(&self) -> Result<SyncStatus> {
        let _job = self.jobs.acquire(JobKind::Fetch, self.settings.job_poll).await;
        let mut state = self.state.lock().await;

        let loaded = match self.refresh_snapshot(&mut state).await {
            Ok(()) => self.load_remote().await,
            Err(err) => Err(err),
        };
        let remote = match loaded {
            Ok(remote) => remote,
            Err(err) => {
                warn!(error = %err, "fetch failed, keeping known deltas");
                state.last_fetch_failed = true;
                state.last_fetch_error = Some(err.to_string());
                return Ok(SyncStatus::Error);
            }
        };

        let local: Vec<TaskCollection> = state.cache.values().cloned().collect();
        let resolved = resolve_snapshots(&local, &remote, &state.collections, &state.items);
        let (collections, items) = match resolved {
            Ok(deltas) => deltas,
            Err(err) => {
                state.last_fetch_failed = true;
                state.last_fetch_error = Some(err.to_string());
                return Err(err);
            }
        };

        state.collections = collections;
        state.items = items;
        state.last_fetch_failed = false;
        state.last_fetch_error = None;

        let status = state.status();
        info!(%status, local = local.len(), remote = remote.len(), "fetch complete");
        Ok(status)
    }

    /// Apply the known deltas: collections before items, remote side before
    /// local side. Refused while the last fetch is failed.
    pub async fn sync_task_lists_and_tasks(&self) -> Result<SyncReport> {
        let _job = self.jobs.acquire(JobKind::Sync, self.settings.job_poll).await;
        let mut state = self.state.lock().await;

        if state.last_fetch_failed {
            warn!("sync refused, last fetch failed");
            return Err(Error::SyncRefused);
        }

        let collections = state.collections.clone();
        let items = state.items.clone();
        let mut links = Links::from_cache(&state.cache);
        let mut report = SyncReport::default();

        self.push_collections(&collections.to_remote, &mut links, &mut report)
            .await;
        self.pull_collections(&collections.to_origin, &mut links, &mut report)
            .await;
        self.push_items(&items.to_remote, &links, &mut report).await;
        self.pull_items(&items.to_origin, &links, &mut report).await;

        state.collections = Delta::new();
        state.items = Delta::new();
        self.refresh_snapshot(&mut state).await?;

        info!(
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed,
            "sync complete"
        );
        Ok(report)
    }

    pub async fn on_local_create(&self, path: &Path) -> Result<SyncStatus> {
        if !self.local.is_tracked_document(path).await? {
            return Ok(self.status().await);
        }
        let _job = self.jobs.acquire(JobKind::Create, self.settings.job_poll).await;
        let mut state = self.state.lock().await;
        self.track_created(&mut state, path).await?;
        Ok(state.status())
    }

    pub async fn on_local_rename(&self, path: &Path, old_path: &Path) -> Result<SyncStatus> {
        if !self.local.is_tracked_document(path).await? {
            return Ok(self.status().await);
        }
        let _job = self.jobs.acquire(JobKind::Rename, self.settings.job_poll).await;
        let mut state = self.state.lock().await;

        if !state.knows(old_path) {
            self.track_created(&mut state, path).await?;
            return Ok(state.status());
        }

        let collection = self.parse_at(path).await?;
        state.tracked.remove(old_path);
        state.tracked.insert(path.to_path_buf());
        state.cache.remove(old_path);

        match state.pending_collection_add(old_path) {
            Some(index) if collection.id.is_none() => {
                state.collections.to_remote.add[index] = collection.clone();
            }
            _ => match collection.id {
                Some(_) => state.collections.replace_remote_modify(collection.clone()),
                None => {
                    state.collections.push_remote_add(collection.clone());
                }
            },
        }

        let parent = collection.parent_ref();
        let Delta {
            to_origin,
            to_remote,
        } = &mut state.items;
        for item in to_remote
            .add
            .iter_mut()
            .chain(to_remote.modify.iter_mut())
            .chain(to_origin.remove_id.iter_mut())
            .filter(|item| item.parent.path.as_deref() == Some(old_path))
        {
            item.parent = parent.clone();
        }

        debug!(from = %old_path.display(), to = %path.display(), "tracked rename");
        state.cache.insert(path.to_path_buf(), collection);
        Ok(state.status())
    }

    pub async fn on_local_modify(&self, path: &Path) -> Result<SyncStatus> {
        if !self.local.is_tracked_document(path).await? {
            return Ok(self.status().await);
        }
        let _job = self.jobs.acquire(JobKind::Modify, self.settings.job_poll).await;
        let mut state = self.state.lock().await;

        if !state.knows(path) {
            self.track_created(&mut state, path).await?;
            return Ok(state.status());
        }

        let text = self.local.read_document(path).await?;
        let modified_time = self.local.document_modified_time(path).await?;
        let current = codec::parse_document(
            &self.local.document_label(path),
            path,
            &text,
            modified_time,
        );

        if self.repair_duplicate_ids(&mut state, path, &text, &current).await? {
            return Ok(state.status());
        }

        let cached = state
            .cache
            .get(path)
            .map(|collection| collection.items.clone())
            .unwrap_or_default();
        let diff = compute_item_deltas(&current.items, &cached, Delta::new())?;

        for item in diff.to_remote.add {
            state.items.push_remote_add(item);
        }
        for item in diff.to_remote.modify {
            state.items.replace_remote_modify(item);
        }
        for gone in cached
            .iter()
            .filter(|item| item.id.is_some())
            .filter(|item| !current.items.iter().any(|now| now.equals(item)))
        {
            state.items.push_remote_delete(gone.clone());
        }

        let unsynced: Vec<&TaskItem> = current.items.iter().filter(|item| item.id.is_none()).collect();
        state.items.to_remote.add.retain(|pending| {
            pending.parent.path.as_deref() != Some(path)
                || pending.id.is_some()
                || unsynced.iter().any(|item| item.same_unsynced(pending))
        });

        if let Some(index) = state.pending_collection_add(path) {
            state.collections.to_remote.add[index] = current.clone();
        }
        state.tracked.insert(path.to_path_buf());
        state.cache.insert(path.to_path_buf(), current);
        Ok(state.status())
    }

    pub async fn on_local_delete(&self, path: &Path) -> Result<SyncStatus> {
        {
            let state = self.state.lock().await;
            if !state.knows(path) {
                return Ok(state.status());
            }
        }
        let _job = self.jobs.acquire(JobKind::Delete, self.settings.job_poll).await;
        let mut state = self.state.lock().await;

        state.tracked.remove(path);
        let cached = state.cache.remove(path);

        if let Some(index) = state.pending_collection_add(path) {
            state.collections.to_remote.add.remove(index);
            state.forget_items_of(path, None);
            debug!(path = %path.display(), "retracted unsynced card");
            return Ok(state.status());
        }

        if let Some(collection) = cached.filter(|collection| collection.id.is_some()) {
            state.forget_items_of(path, collection.id.as_deref());
            state.collections.push_remote_delete(collection);
        } else {
            state.forget_items_of(path, None);
        }
        Ok(state.status())
    }

    async fn track_created(&self, state: &mut EngineState, path: &Path) -> Result<()> {
        let collection = self.parse_at(path).await?;
        state.tracked.insert(path.to_path_buf());

        if collection.id.is_none() {
            state.collections.push_remote_add(collection.clone());
            for item in collection.items.iter().filter(|item| item.id.is_none()) {
                state.items.push_remote_add(item.clone());
            }
        }
        debug!(path = %path.display(), id = ?collection.id, "tracked new card");
        state.cache.insert(path.to_path_buf(), collection);
        Ok(())
    }

    /// Keep each duplicated id on the line with the earliest due date and
    /// strip it from the others. Returns whether anything was repaired.
    async fn repair_duplicate_ids(
        &self,
        state: &mut EngineState,
        path: &Path,
        text: &str,
        current: &TaskCollection,
    ) -> Result<bool> {
        let parent = current.parent_ref();
        let lines: Vec<(usize, TaskItem)> = text
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                codec::parse_line(line, current.modified_time)
                    .map(|item| (index, item.with_parent(parent.clone())))
            })
            .collect();

        let mut by_id: BTreeMap<&str, Vec<&(usize, TaskItem)>> = BTreeMap::new();
        for entry in &lines {
            if let Some(id) = entry.1.id.as_deref() {
                by_id.entry(id).or_default().push(entry);
            }
        }

        let mut repaired = text.to_string();
        let mut found = false;
        for (id, group) in by_id.into_iter().filter(|(_, group)| group.len() > 1) {
            found = true;
            let keeper = group
                .iter()
                .enumerate()
                .min_by_key(|(order, (_, item))| {
                    (item.due_date.is_none(), item.due_date.clone(), *order)
                })
                .map(|(order, _)| order)
                .unwrap_or(0);

            for (order, (line, item)) in group.iter().map(|entry| (entry.0, &entry.1)).enumerate() {
                if order == keeper {
                    state.items.replace_remote_modify(item.clone());
                    continue;
                }
                repaired = codec::strip_item_id_at(&repaired, line);
                let mut stripped = item.clone();
                stripped.id = None;
                state.items.push_remote_add(stripped);
            }
            info!(path = %path.display(), id, copies = group.len(), "repaired duplicate id");
        }

        if found {
            self.write_card(path, &repaired).await?;
        }
        Ok(found)
    }

    async fn parse_at(&self, path: &Path) -> Result<TaskCollection> {
        let text = self.local.read_document(path).await?;
        let modified_time = self.local.document_modified_time(path).await?;
        let label = self.local.document_label(path);
        Ok(codec::parse_document(&label, path, &text, modified_time))
    }

    async fn refresh_snapshot(&self, state: &mut EngineState) -> Result<()> {
        let documents = self.local.list_tracked_documents().await?;
        let mut cache = BTreeMap::new();
        for document in documents {
            match self.parse_at(&document.path).await {
                Ok(collection) => {
                    cache.insert(document.path, collection);
                }
                Err(Error::DocumentNotFound(path)) => {
                    debug!(path = %path.display(), "document vanished while loading");
                }
                Err(err) => return Err(err),
            }
        }
        state.tracked = cache.keys().cloned().collect();
        state.cache = cache;
        Ok(())
    }

    async fn write_card(&self, path: &Path, text: &str) -> Result<()> {
        if self.settings.reorder_on_write {
            self.local.write_document(path, &reorder_document(text)).await
        } else {
            self.local.write_document(path, text).await
        }
    }

    async fn load_remote(&self) -> Result<Vec<TaskCollection>> {
        let lists = self.remote_lists().await?;
        let mut collections = Vec::with_capacity(lists.len());
        for list in &lists {
            let mut collection = remote::collection_from_remote(list);
            let tasks = self.remote_tasks(&list.id).await?;
            collection.items = tasks
                .iter()
                .map(|task| remote::item_from_remote(task, &collection))
                .collect();
            collections.push(collection);
        }
        Ok(collections)
    }

    async fn remote_lists(&self) -> Result<Vec<RemoteList>> {
        let mut lists = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            self.throttle.acquire().await;
            let page = self.remote.list_collections(cursor.as_deref()).await?;
            let empty = page.items.is_empty();
            lists.extend(page.items);
            match page.next {
                Some(next) if !empty => cursor = Some(next),
                _ => break,
            }
        }
        Ok(lists)
    }

    async fn remote_tasks(&self, list_id: &str) -> Result<Vec<RemoteTask>> {
        let mut tasks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            self.throttle.acquire().await;
            let page = self.remote.list_items(list_id, cursor.as_deref()).await?;
            let empty = page.items.is_empty();
            tasks.extend(page.items);
            match page.next {
                Some(next) if !empty => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tasks)
    }

    fn tally(report: &mut SyncReport, what: &str, outcome: Result<Applied>) {
        match outcome {
            Ok(Applied::Done) => report.applied += 1,
            Ok(Applied::Skipped) => report.skipped += 1,
            Err(err) => {
                warn!(error = %err, what, "failed to apply change");
                report.failed += 1;
            }
        }
    }

    async fn push_collections(
        &self,
        delta: &RemoteDelta<TaskCollection>,
        links: &mut Links,
        report: &mut SyncReport,
    ) {
        for collection in &delta.add {
            let outcome = self.create_remote_collection(collection, links).await;
            Self::tally(report, "create list", outcome);
        }
        for collection in &delta.modify {
            let outcome = self.update_remote_collection(collection).await;
            Self::tally(report, "update list", outcome);
        }
        for collection in &delta.delete {
            let outcome = self.delete_remote_collection(collection).await;
            Self::tally(report, "delete list", outcome);
        }
    }

    async fn create_remote_collection(
        &self,
        collection: &TaskCollection,
        links: &mut Links,
    ) -> Result<Applied> {
        self.throttle.acquire().await;
        let created = self
            .remote
            .create_collection(&remote::collection_to_remote(collection))
            .await?;
        info!(label = %collection.label(), id = %created.id, "created remote list");

        if let Some(path) = &collection.path {
            let text = self.local.read_document(path).await?;
            self.write_card(path, &codec::set_collection_id(&text, &created.id))
                .await?;
            links.link(path.clone(), created.id);
        }
        Ok(Applied::Done)
    }

    async fn update_remote_collection(&self, collection: &TaskCollection) -> Result<Applied> {
        let Some(id) = collection.id.as_deref() else {
            warn!(label = %collection.label(), "list update without id");
            return Ok(Applied::Skipped);
        };
        self.throttle.acquire().await;
        self.remote
            .update_collection(id, &remote::collection_to_remote(collection))
            .await?;
        Ok(Applied::Done)
    }

    async fn delete_remote_collection(&self, collection: &TaskCollection) -> Result<Applied> {
        let Some(id) = collection.id.as_deref() else {
            return Ok(Applied::Skipped);
        };
        self.throttle.acquire().await;
        self.remote.delete_collection(id).await?;
        info!(label = %collection.label(), id, "deleted remote list");
        Ok(Applied::Done)
    }

    async fn pull_collections(
        &self,
        delta: &OriginDelta<TaskCollection>,
        links: &mut Links,
        report: &mut SyncReport,
    ) {
        for collection in &delta.add {
            let outcome = self.create_local_collection(collection, links).await;
            Self::tally(report, "create card", outcome);
        }
        for collection in &delta.modify {
            let outcome = self.rename_local_collection(collection, links).await;
            Self::tally(report, "rename card", outcome);
        }
        for collection in &delta.remove_id {
            let outcome = self.unlink_local_collection(collection).await;
            Self::tally(report, "unlink card", outcome);
        }
    }

    async fn create_local_collection(
        &self,
        collection: &TaskCollection,
        links: &mut Links,
    ) -> Result<Applied> {
        let Some(id) = collection.id.clone() else {
            return Ok(Applied::Skipped);
        };
        let body = codec::set_collection_id("", &id);
        let path = self.local.create_document(&collection.label(), &body).await?;
        info!(path = %path.display(), id = %id, "created card for remote list");
        links.link(path, id);
        Ok(Applied::Done)
    }

    async fn rename_local_collection(
        &self,
        collection: &TaskCollection,
        links: &mut Links,
    ) -> Result<Applied> {
        let Some(id) = collection.id.clone() else {
            return Ok(Applied::Skipped);
        };
        let Some(path) = links.path_by_list.get(&id).cloned() else {
            warn!(id = %id, "no card for renamed list");
            return Ok(Applied::Skipped);
        };
        let moved = self.local.rename_document(&path, &collection.label()).await?;
        links.list_by_path.remove(&path);
        links.link(moved, id);
        Ok(Applied::Done)
    }

    async fn unlink_local_collection(&self, collection: &TaskCollection) -> Result<Applied> {
        let Some(path) = &collection.path else {
            return Ok(Applied::Skipped);
        };
        let text = self.local.read_document(path).await?;
        self.write_card(path, &codec::strip_collection_id(&text))
            .await?;
        Ok(Applied::Done)
    }

    async fn push_items(&self, delta: &RemoteDelta<TaskItem>, links: &Links, report: &mut SyncReport) {
        for item in &delta.add {
            let outcome = self.create_remote_item(item, links).await;
            Self::tally(report, "create task", outcome);
        }
        for item in &delta.modify {
            let outcome = self.update_remote_item(item, links).await;
            Self::tally(report, "update task", outcome);
        }
        for item in &delta.delete {
            let outcome = self.delete_remote_item(item, links).await;
            Self::tally(report, "delete task", outcome);
        }
    }

    async fn create_remote_item(&self, item: &TaskItem, links: &Links) -> Result<Applied> {
        let Some(list_id) = links.list_for(item) else {
            warn!(title = %item.title, list = %item.parent.label(), "no remote list for task");
            return Ok(Applied::Skipped);
        };
        self.throttle.acquire().await;
        let created = self
            .remote
            .create_item(&list_id, &remote::item_to_remote(item, &self.settings.time_zone))
            .await?;

        let Some(path) = &item.parent.path else {
            return Ok(Applied::Done);
        };
        let text = self.local.read_document(path).await?;
        match codec::set_item_id(&text, item, &created.id) {
            Some(updated) => self.write_card(path, &updated).await?,
            None => warn!(title = %item.title, path = %path.display(), "created task has no line to tag"),
        }
        Ok(Applied::Done)
    }

    async fn update_remote_item(&self, item: &TaskItem, links: &Links) -> Result<Applied> {
        let (Some(list_id), Some(id)) = (links.list_for(item), item.id.as_deref()) else {
            warn!(title = %item.title, "task update without list or id");
            return Ok(Applied::Skipped);
        };
        self.throttle.acquire().await;
        self.remote
            .update_item(&list_id, id, &remote::item_to_remote(item, &self.settings.time_zone))
            .await?;
        Ok(Applied::Done)
    }

    async fn delete_remote_item(&self, item: &TaskItem, links: &Links) -> Result<Applied> {
        let (Some(list_id), Some(id)) = (links.list_for(item), item.id.as_deref()) else {
            return Ok(Applied::Skipped);
        };
        self.throttle.acquire().await;
        self.remote.delete_item(&list_id, id).await?;
        Ok(Applied::Done)
    }

    async fn pull_items(&self, delta: &OriginDelta<TaskItem>, links: &Links, report: &mut SyncReport) {
        for item in &delta.add {
            let outcome = self.edit_card(item, links, |text| Some(codec::append_item(text, item))).await;
            Self::tally(report, "add task line", outcome);
        }
        for item in &delta.modify {
            let outcome = self
                .edit_card(item, links, |text| {
                    item.id
                        .as_deref()
                        .and_then(|id| codec::replace_item_line(text, id, item))
                })
                .await;
            Self::tally(report, "update task line", outcome);
        }
        for item in &delta.remove_id {
            let outcome = self
                .edit_card(item, links, |text| {
                    item.id.as_deref().and_then(|id| codec::strip_item_id(text, id))
                })
                .await;
            Self::tally(report, "untag task line", outcome);
        }
    }

    async fn edit_card<F>(&self, item: &TaskItem, links: &Links, edit: F) -> Result<Applied>
    where
        F: FnOnce(&str) -> Option<String> + Send,
    {
        let Some(path) = links.path_for(item) else {
            warn!(title = %item.title, list = %item.parent.label(), "no card for task");
            return Ok(Applied::Skipped);
        };
        let text = self.local.read_document(&path).await?;
        match edit(&text) {
            Some(updated) => {
                self.write_card(&path, &updated).await?;
                Ok(Applied::Done)
            }
            None => {
                warn!(title = %item.title, path = %path.display(), "no matching task line");
                Ok(Applied::Skipped)
            }
        }
    }
}

/// Resolve collections, then items, against the known deltas.
fn resolve_snapshots(
    local: &[TaskCollection],
    remote: &[TaskCollection],
    known_collections: &Delta<TaskCollection>,
    known_items: &Delta<TaskItem>,
) -> Result<(Delta<TaskCollection>, Delta<TaskItem>)> {
    let collections = compute_collection_deltas(local, remote, known_collections.clone())?;

    let deleted: HashSet<&str> = collections
        .to_remote
        .delete
        .iter()
        .filter_map(|collection| collection.id.as_deref())
        .collect();
    let local_items: Vec<TaskItem> = local
        .iter()
        .flat_map(|collection| collection.items.iter().cloned())
        .collect();
    let remote_items: Vec<TaskItem> = remote
        .iter()
        .filter(|collection| {
            collection
                .id
                .as_deref()
                .map_or(true, |id| !deleted.contains(id))
        })
        .flat_map(|collection| collection.items.iter().cloned())
        .collect();
    let groups: HashSet<Option<String>> = local
        .iter()
        .map(|collection| collection.group.clone())
        .collect();

    let items = compute_item_deltas_with_groups(
        &local_items,
        &remote_items,
        known_items.clone(),
        &groups,
    )?;
    Ok((collections, items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaCounts;

    #[test]
    fn status_tokens() {
        assert_eq!(SyncStatus::Synced.to_string(), "synced");
        assert_eq!(SyncStatus::Error.to_string(), "error");
        assert_eq!(
            SyncStatus::Pending {
                to_origin: 2,
                to_remote: 1
            }
            .to_string(),
            "↓2 ↑1"
        );
        assert_eq!(
            SyncStatus::from_counts(DeltaCounts::default()),
            SyncStatus::Synced
        );
    }

    #[test]
    fn items_of_lists_pending_deletion_are_ignored() {
        let mut known = Delta::new();
        known
            .to_remote
            .delete
            .push(TaskCollection::from_label("Work > Old").with_id("OLD"));

        let mut old = TaskCollection::from_label("Work > Old").with_id("OLD");
        old.add_items(vec![TaskItem::new("orphan").with_id("T1")]);
        let mut kept = TaskCollection::from_label("Work > Kept").with_id("KEPT");
        kept.add_items(vec![TaskItem::new("fresh").with_id("T2")]);
        let local = vec![TaskCollection::from_label("Work > Kept")
            .with_id("KEPT")
            .with_path("Work/Kept.md")];

        let (collections, items) =
            resolve_snapshots(&local, &[old, kept], &known, &Delta::new()).expect("resolve");
        assert_eq!(collections.to_remote.delete.len(), 1);
        let titles: Vec<&str> = items.to_origin.add.iter().map(|item| item.title.as_str()).collect();
        assert_eq!(titles, vec!["fresh"]);
    }

    #[test]
    fn links_resolve_by_id_then_path() {
        let mut links = Links::default();
        links.link(PathBuf::from("Work/New.md"), "NEW".to_string());

        let unsynced_parent = TaskCollection::from_label("Work > New").with_path("Work/New.md");
        let item = TaskItem::new("t").with_parent(unsynced_parent.parent_ref());
        assert_eq!(links.list_for(&item).as_deref(), Some("NEW"));

        let remote_parent = TaskCollection::from_label("Work > New").with_id("NEW");
        let item = TaskItem::new("t").with_parent(remote_parent.parent_ref());
        assert_eq!(links.path_for(&item), Some(PathBuf::from("Work/New.md")));
    }
}
