//! Remote task-list service boundary.
//!
//! The wire types follow the Microsoft To Do shape (`displayName`,
//! `dueDateTime`, `lastModifiedDateTime`). Anything that can list and edit
//! lists and tasks can implement [`RemoteService`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collection::TaskCollection;
use crate::error::Result;
use crate::task::{TaskItem, TaskPriority, TaskStatus, DEFAULT_COLLECTION_NAME};

/// Well-known name the service gives its catch-all list.
pub const DEFAULT_LIST_WELLKNOWN_NAME: &str = "defaultList";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteList {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing)]
    pub wellknown_list_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub last_modified_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    pub content: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeTimeZone {
    pub date_time: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTask {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ItemBody>,
    #[serde(default)]
    pub due_date_time: Option<DateTimeTimeZone>,
    #[serde(default, skip_serializing)]
    pub last_modified_date_time: Option<DateTime<Utc>>,
}

/// One page of a listing plus the cursor for the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn list_collections(&self, cursor: Option<&str>) -> Result<Page<RemoteList>>;

    async fn list_items(&self, collection_id: &str, cursor: Option<&str>)
        -> Result<Page<RemoteTask>>;

    async fn create_collection(&self, list: &RemoteList) -> Result<RemoteList>;

    async fn update_collection(&self, collection_id: &str, list: &RemoteList)
        -> Result<RemoteList>;

    async fn delete_collection(&self, collection_id: &str) -> Result<()>;

    async fn create_item(&self, collection_id: &str, task: &RemoteTask) -> Result<RemoteTask>;

    async fn update_item(
        &self,
        collection_id: &str,
        item_id: &str,
        task: &RemoteTask,
    ) -> Result<RemoteTask>;

    async fn delete_item(&self, collection_id: &str, item_id: &str) -> Result<()>;
}

fn timestamp_millis(value: Option<&DateTime<Utc>>) -> i64 {
    value.map(DateTime::timestamp_millis).unwrap_or(0)
}

/// Snapshot of a remote list (without its tasks).
pub fn collection_from_remote(list: &RemoteList) -> TaskCollection {
    let label = if list.wellknown_list_name.as_deref() == Some(DEFAULT_LIST_WELLKNOWN_NAME) {
        DEFAULT_COLLECTION_NAME
    } else {
        list.display_name.as_str()
    };
    let collection = TaskCollection::from_label(label)
        .with_modified_time(timestamp_millis(list.last_modified_date_time.as_ref()));
    collection.with_id(list.id.clone())
}

pub fn collection_to_remote(collection: &TaskCollection) -> RemoteList {
    RemoteList {
        id: collection.id.clone().unwrap_or_default(),
        display_name: collection.label(),
        ..RemoteList::default()
    }
}

/// Snapshot of a remote task inside `parent`.
pub fn item_from_remote(task: &RemoteTask, parent: &TaskCollection) -> TaskItem {
    let due = task
        .due_date_time
        .as_ref()
        .and_then(|due| due.date_time.split('T').next())
        .unwrap_or_default();
    let priority = task
        .body
        .as_ref()
        .map(|body| TaskPriority::from_marker(&body.content))
        .unwrap_or_default();

    TaskItem::new(task.title.trim())
        .with_status(task.status)
        .with_due(due)
        .with_priority(priority)
        .with_modified_time(timestamp_millis(task.last_modified_date_time.as_ref()))
        .with_id(task.id.clone())
        .with_parent(parent.parent_ref())
}

pub fn item_to_remote(item: &TaskItem, time_zone: &str) -> RemoteTask {
    RemoteTask {
        id: item.id.clone().unwrap_or_default(),
        title: item.title.clone(),
        status: item.status,
        body: Some(ItemBody {
            content: item.priority.marker().to_string(),
            content_type: "text".to_string(),
        }),
        due_date_time: item.due_date.as_ref().map(|due| DateTimeTimeZone {
            date_time: format!("{due}T00:00:00.0000000"),
            time_zone: time_zone.to_string(),
        }),
        last_modified_date_time: None,
    }
}
