//! Task collections: one local card document or one remote list.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::resolver::Reconcilable;
use crate::task::{join_label, split_label, ParentRef, TaskItem, DEFAULT_COLLECTION_NAME};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskCollection {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub modified_time: i64,
    /// Backing document, for local snapshots only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub items: Vec<TaskItem>,
}

impl TaskCollection {
    /// Build an empty collection from a `"Group > Name"` label.
    pub fn from_label(label: &str) -> Self {
        let (group, name) = split_label(label);
        Self {
            name,
            group,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = crate::task::normalize_id(Some(id.into()));
        self
    }

    pub fn with_modified_time(mut self, modified_time: i64) -> Self {
        self.modified_time = modified_time;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn label(&self) -> String {
        join_label(self.group.as_deref(), &self.name)
    }

    pub fn is_default_collection(&self) -> bool {
        self.name == DEFAULT_COLLECTION_NAME
    }

    /// Reference handed to contained items.
    pub fn parent_ref(&self) -> ParentRef {
        ParentRef {
            name: self.name.clone(),
            group: self.group.clone(),
            id: self.id.clone(),
            path: self.path.clone(),
        }
    }

    /// Append items, re-pointing them at this collection and keeping the
    /// collection's modified time at the newest item.
    pub fn add_items(&mut self, items: impl IntoIterator<Item = TaskItem>) {
        let parent = self.parent_ref();
        for mut item in items {
            item.parent = parent.clone();
            self.modified_time = self.modified_time.max(item.modified_time);
            self.items.push(item);
        }
    }

    pub fn has_same_properties(&self, other: &TaskCollection) -> bool {
        self.name == other.name && self.group == other.group
    }
}

impl Reconcilable for TaskCollection {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn modified_time(&self) -> i64 {
        self.modified_time
    }

    fn has_same_properties(&self, other: &Self) -> bool {
        TaskCollection::has_same_properties(self, other)
    }

    fn same_snapshot(&self, other: &Self) -> bool {
        self.has_same_properties(other)
    }

    fn group_key(&self) -> Option<&str> {
        self.group.as_deref()
    }

    fn is_default_collection(&self) -> bool {
        TaskCollection::is_default_collection(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trips_through_group() {
        let list = TaskCollection::from_label("Work > Launch");
        assert_eq!(list.group.as_deref(), Some("Work"));
        assert_eq!(list.name, "Launch");
        assert_eq!(list.label(), "Work > Launch");
    }

    #[test]
    fn staleness_requires_name_or_group_change() {
        let old = TaskCollection::from_label("Work > Launch")
            .with_id("L")
            .with_modified_time(1);
        let renamed = TaskCollection::from_label("Work > Release")
            .with_id("L")
            .with_modified_time(2);
        let touched = TaskCollection::from_label("Work > Launch")
            .with_id("L")
            .with_modified_time(9);

        assert!(old.is_older_version_of(&renamed));
        assert!(!renamed.is_older_version_of(&old));
        assert!(!old.is_older_version_of(&touched));
        assert!(!touched.is_older_version_of(&old));
    }

    #[test]
    fn regrouping_is_a_change() {
        let old = TaskCollection::from_label("Work > Launch").with_id("L");
        let moved = TaskCollection::from_label("Home > Launch")
            .with_id("L")
            .with_modified_time(5);
        assert!(old.is_older_version_of(&moved));
    }

    #[test]
    fn added_items_point_back_and_bump_time() {
        let mut list = TaskCollection::from_label("Work > Launch")
            .with_id("L")
            .with_path("Work/Launch.md");
        list.add_items(vec![
            TaskItem::new("a").with_modified_time(3),
            TaskItem::new("b").with_modified_time(7),
        ]);

        assert_eq!(list.modified_time, 7);
        assert!(list
            .items
            .iter()
            .all(|item| item.parent.id.as_deref() == Some("L")));
        assert_eq!(list.items[0].parent.label(), "Work > Launch");
    }

    #[test]
    fn sentinel_name_marks_default_collection() {
        assert!(TaskCollection::from_label(DEFAULT_COLLECTION_NAME).is_default_collection());
        assert!(!TaskCollection::from_label("Inbox").is_default_collection());
    }
}
