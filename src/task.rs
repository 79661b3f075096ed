//! Task items as seen from either side of a sync.
//!
//! A `TaskItem` is a snapshot: it is built fresh from a checklist line or a
//! remote payload on every cycle and compared against another snapshot, never
//! updated in place.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::resolver::Reconcilable;

/// Name given to the remote service's catch-all list.
pub const DEFAULT_COLLECTION_NAME: &str = "__Other";

/// Separator between group and name in a collection label.
pub const LABEL_SEPARATOR: &str = " > ";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    WaitingOnOthers,
    Deferred,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::NotStarted,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::WaitingOnOthers,
        TaskStatus::Deferred,
    ];

    /// Checkbox symbol used in markdown.
    pub fn symbol(self) -> char {
        match self {
            TaskStatus::NotStarted => ' ',
            TaskStatus::InProgress => '/',
            TaskStatus::Completed => 'x',
            TaskStatus::WaitingOnOthers => '!',
            TaskStatus::Deferred => 'B',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.symbol() == symbol)
    }

    /// Status name used by the remote service.
    pub fn remote_name(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "notStarted",
            TaskStatus::InProgress => "inProgress",
            TaskStatus::Completed => "completed",
            TaskStatus::WaitingOnOthers => "waitingOnOthers",
            TaskStatus::Deferred => "deferred",
        }
    }

    pub fn from_remote_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.remote_name() == name.trim())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Highest,
    High,
    Medium,
    #[default]
    Normal,
    Low,
    Lowest,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 6] = [
        TaskPriority::Highest,
        TaskPriority::High,
        TaskPriority::Medium,
        TaskPriority::Normal,
        TaskPriority::Low,
        TaskPriority::Lowest,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskPriority::Highest => "highest",
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
            TaskPriority::Lowest => "lowest",
        }
    }

    /// Compact marker stored remotely; normal has none.
    pub fn marker(self) -> &'static str {
        match self {
            TaskPriority::Highest => "^^",
            TaskPriority::High => "^",
            TaskPriority::Medium => "o",
            TaskPriority::Normal => "",
            TaskPriority::Low => "v",
            TaskPriority::Lowest => "vv",
        }
    }

    /// Unknown or empty markers read as normal.
    pub fn from_marker(marker: &str) -> Self {
        let marker = marker.trim();
        Self::ALL
            .into_iter()
            .find(|priority| !marker.is_empty() && priority.marker() == marker)
            .unwrap_or_default()
    }

    /// Accepts either the name or the marker form.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Some(TaskPriority::Normal);
        }
        Self::ALL.into_iter().find(|priority| {
            priority.name().eq_ignore_ascii_case(value) || priority.marker() == value
        })
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lightweight pointer from an item to the collection it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParentRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Backing document, for local snapshots only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ParentRef {
    pub fn is_default_collection(&self) -> bool {
        self.name == DEFAULT_COLLECTION_NAME
    }

    pub fn label(&self) -> String {
        join_label(self.group.as_deref(), &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskItem {
    pub title: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub priority: TaskPriority,
    pub modified_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub parent: ParentRef,
}

impl TaskItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = normalize_id(Some(id.into()));
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_due(mut self, due: impl Into<String>) -> Self {
        let due = due.into();
        self.due_date = (!due.trim().is_empty()).then(|| due.trim().to_string());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_modified_time(mut self, modified_time: i64) -> Self {
        self.modified_time = modified_time;
        self
    }

    pub fn with_parent(mut self, parent: ParentRef) -> Self {
        self.parent = parent;
        self
    }

    pub fn has_same_properties(&self, other: &TaskItem) -> bool {
        self.title == other.title
            && self.status == other.status
            && self.due_date == other.due_date
            && self.priority == other.priority
    }
}

impl Reconcilable for TaskItem {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn modified_time(&self) -> i64 {
        self.modified_time
    }

    fn has_same_properties(&self, other: &Self) -> bool {
        TaskItem::has_same_properties(self, other)
    }

    fn same_snapshot(&self, other: &Self) -> bool {
        self.has_same_properties(other) && self.parent.label() == other.parent.label()
    }

    fn group_key(&self) -> Option<&str> {
        self.parent.group.as_deref()
    }

    fn is_default_collection(&self) -> bool {
        self.parent.is_default_collection()
    }
}

/// Treat blank ids as absent.
pub fn normalize_id(id: Option<String>) -> Option<String> {
    id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty())
}

/// Split a `"Group > Name"` label into its parts.
pub fn split_label(label: &str) -> (Option<String>, String) {
    match label.split_once(LABEL_SEPARATOR) {
        Some((group, name)) if !group.trim().is_empty() => {
            (Some(group.trim().to_string()), name.trim().to_string())
        }
        Some((_, name)) => (None, name.trim().to_string()),
        None => (None, label.trim().to_string()),
    }
}

pub fn join_label(group: Option<&str>, name: &str) -> String {
    match group {
        Some(group) => format!("{group}{LABEL_SEPARATOR}{name}"),
        None => name.to_string(),
    }
}
