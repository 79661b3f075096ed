#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cardsync::config::VaultConfig;
use cardsync::engine::{EngineSettings, SyncEngine};
use cardsync::error::{Error, Result};
use cardsync::remote::{Page, RemoteList, RemoteService, RemoteTask, DEFAULT_LIST_WELLKNOWN_NAME};
use cardsync::vault::Vault;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

pub const TAG_HEADER: &str = "---\ntags:\n  - kanban_card\n---\n";

/// A point in time far behind any file written by a test.
pub fn long_ago() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// A point in time far ahead of any file written by a test.
pub fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

#[derive(Debug, Clone)]
pub struct FakeList {
    pub list: RemoteList,
    pub tasks: Vec<RemoteTask>,
}

#[derive(Debug, Default)]
struct FakeState {
    lists: Vec<FakeList>,
    next_id: u64,
    fail_reads: bool,
    /// Task titles whose create or update calls fail.
    failing_titles: Vec<String>,
    writes: Vec<String>,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn list_mut(&mut self, id: &str) -> Result<&mut FakeList> {
        self.lists
            .iter_mut()
            .find(|entry| entry.list.id == id)
            .ok_or_else(|| not_found(id))
    }
}

fn not_found(id: &str) -> Error {
    Error::Remote {
        status: 404,
        message: format!("{id} not found"),
    }
}

fn check_title(state: &FakeState, title: &str) -> Result<()> {
    if state.failing_titles.iter().any(|failing| failing == title) {
        return Err(Error::Remote {
            status: 500,
            message: format!("write of '{title}' rejected"),
        });
    }
    Ok(())
}

fn page<T: Clone>(all: &[T], cursor: Option<&str>, page_size: usize) -> Page<T> {
    let start = cursor.and_then(|raw| raw.parse::<usize>().ok()).unwrap_or(0);
    let end = (start + page_size).min(all.len());
    let items = all.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    let next = (end < all.len()).then(|| end.to_string());
    Page { items, next }
}

/// In-memory remote service with paging and an outage switch.
#[derive(Debug)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
    page_size: usize,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::with_page_size(2)
    }
}

impl FakeRemote {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            page_size: page_size.max(1),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_list(&self, display_name: &str) -> String {
        let mut state = self.state();
        let id = state.next_id("L");
        state.lists.push(FakeList {
            list: RemoteList {
                id: id.clone(),
                display_name: display_name.to_string(),
                wellknown_list_name: None,
                last_modified_date_time: Some(long_ago()),
            },
            tasks: Vec::new(),
        });
        id
    }

    pub fn add_default_list(&self) -> String {
        let mut state = self.state();
        let id = state.next_id("L");
        state.lists.push(FakeList {
            list: RemoteList {
                id: id.clone(),
                display_name: "Tasks".to_string(),
                wellknown_list_name: Some(DEFAULT_LIST_WELLKNOWN_NAME.to_string()),
                last_modified_date_time: Some(long_ago()),
            },
            tasks: Vec::new(),
        });
        id
    }

    /// Add a task as of `modified`; returns its id.
    pub fn add_task(&self, list_id: &str, title: &str, modified: DateTime<Utc>) -> String {
        let mut state = self.state();
        let id = state.next_id("T");
        let list = state.list_mut(list_id).expect("list exists");
        list.tasks.push(RemoteTask {
            id: id.clone(),
            title: title.to_string(),
            last_modified_date_time: Some(modified),
            ..RemoteTask::default()
        });
        id
    }

    /// Edit a task in place as if another client had changed it.
    pub fn edit_task(&self, list_id: &str, task_id: &str, edit: impl FnOnce(&mut RemoteTask)) {
        let mut state = self.state();
        let list = state.list_mut(list_id).expect("list exists");
        let task = list
            .tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .expect("task exists");
        edit(task);
    }

    pub fn rename_list(&self, list_id: &str, display_name: &str, modified: DateTime<Utc>) {
        let mut state = self.state();
        let entry = state.list_mut(list_id).expect("list exists");
        entry.list.display_name = display_name.to_string();
        entry.list.last_modified_date_time = Some(modified);
    }

    pub fn remove_task(&self, list_id: &str, task_id: &str) {
        let mut state = self.state();
        let list = state.list_mut(list_id).expect("list exists");
        list.tasks.retain(|task| task.id != task_id);
    }

    pub fn lists(&self) -> Vec<FakeList> {
        self.state().lists.clone()
    }

    pub fn list_named(&self, display_name: &str) -> Option<FakeList> {
        self.lists()
            .into_iter()
            .find(|entry| entry.list.display_name == display_name)
    }

    pub fn tasks(&self, list_id: &str) -> Vec<RemoteTask> {
        self.lists()
            .into_iter()
            .find(|entry| entry.list.id == list_id)
            .map(|entry| entry.tasks)
            .unwrap_or_default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    /// Make every create or update of a task titled `title` fail.
    pub fn fail_task_writes(&self, title: &str) {
        self.state().failing_titles.push(title.to_string());
    }

    /// Every write call so far, e.g. `"create_item L1"`.
    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }

    fn check_reads(&self) -> Result<()> {
        if self.state().fail_reads {
            return Err(Error::Remote {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn list_collections(&self, cursor: Option<&str>) -> Result<Page<RemoteList>> {
        self.check_reads()?;
        let lists: Vec<RemoteList> = self.state().lists.iter().map(|entry| entry.list.clone()).collect();
        Ok(page(&lists, cursor, self.page_size))
    }

    async fn list_items(&self, collection_id: &str, cursor: Option<&str>) -> Result<Page<RemoteTask>> {
        self.check_reads()?;
        let mut state = self.state();
        let tasks = state.list_mut(collection_id)?.tasks.clone();
        Ok(page(&tasks, cursor, self.page_size))
    }

    async fn create_collection(&self, list: &RemoteList) -> Result<RemoteList> {
        let mut state = self.state();
        let id = state.next_id("L");
        let created = RemoteList {
            id: id.clone(),
            display_name: list.display_name.clone(),
            wellknown_list_name: None,
            last_modified_date_time: Some(Utc::now()),
        };
        state.lists.push(FakeList {
            list: created.clone(),
            tasks: Vec::new(),
        });
        state.writes.push(format!("create_collection {id}"));
        Ok(created)
    }

    async fn update_collection(&self, collection_id: &str, list: &RemoteList) -> Result<RemoteList> {
        let mut state = self.state();
        let entry = state.list_mut(collection_id)?;
        entry.list.display_name = list.display_name.clone();
        entry.list.last_modified_date_time = Some(Utc::now());
        let updated = entry.list.clone();
        state.writes.push(format!("update_collection {collection_id}"));
        Ok(updated)
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        let mut state = self.state();
        state.list_mut(collection_id)?;
        state.lists.retain(|entry| entry.list.id != collection_id);
        state.writes.push(format!("delete_collection {collection_id}"));
        Ok(())
    }

    async fn create_item(&self, collection_id: &str, task: &RemoteTask) -> Result<RemoteTask> {
        let mut state = self.state();
        check_title(&state, &task.title)?;
        let id = state.next_id("T");
        let created = RemoteTask {
            id: id.clone(),
            last_modified_date_time: Some(Utc::now()),
            ..task.clone()
        };
        state.list_mut(collection_id)?.tasks.push(created.clone());
        state.writes.push(format!("create_item {collection_id}"));
        Ok(created)
    }

    async fn update_item(
        &self,
        collection_id: &str,
        item_id: &str,
        task: &RemoteTask,
    ) -> Result<RemoteTask> {
        let mut state = self.state();
        check_title(&state, &task.title)?;
        let list = state.list_mut(collection_id)?;
        let existing = list
            .tasks
            .iter_mut()
            .find(|existing| existing.id == item_id)
            .ok_or_else(|| not_found(item_id))?;
        *existing = RemoteTask {
            id: item_id.to_string(),
            last_modified_date_time: Some(Utc::now()),
            ..task.clone()
        };
        let updated = existing.clone();
        state.writes.push(format!("update_item {item_id}"));
        Ok(updated)
    }

    async fn delete_item(&self, collection_id: &str, item_id: &str) -> Result<()> {
        let mut state = self.state();
        let list = state.list_mut(collection_id)?;
        let before = list.tasks.len();
        list.tasks.retain(|task| task.id != item_id);
        if list.tasks.len() == before {
            return Err(not_found(item_id));
        }
        state.writes.push(format!("delete_item {item_id}"));
        Ok(())
    }
}

/// A temporary vault plus an engine wired to a [`FakeRemote`].
pub struct TestVault {
    dir: TempDir,
    pub vault: Vault,
    pub remote: Arc<FakeRemote>,
    pub engine: SyncEngine,
}

impl TestVault {
    pub fn new() -> Self {
        Self::with_remote(FakeRemote::default())
    }

    pub fn with_remote(remote: FakeRemote) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let vault = Vault::open(dir.path(), &VaultConfig::default()).expect("open vault");
        let remote = Arc::new(remote);
        let settings = EngineSettings {
            job_poll: Duration::from_millis(5),
            max_calls_per_sec: 1_000,
            ..EngineSettings::default()
        };
        let engine = SyncEngine::new(Arc::new(vault.clone()), remote.clone(), settings);
        Self {
            dir,
            vault,
            remote,
            engine,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a tagged card at `rel_path` holding `body`.
    pub fn write_card(&self, rel_path: &str, body: &str) -> PathBuf {
        self.write_file(rel_path, &format!("{TAG_HEADER}{body}"))
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write file");
        PathBuf::from(rel_path)
    }

    pub fn read(&self, rel_path: &str) -> String {
        fs::read_to_string(self.dir.path().join(rel_path)).expect("read file")
    }

    pub fn remove(&self, rel_path: &str) {
        fs::remove_file(self.dir.path().join(rel_path)).expect("remove file");
    }

    pub fn exists(&self, rel_path: &str) -> bool {
        self.dir.path().join(rel_path).exists()
    }
}
