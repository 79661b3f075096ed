//! cardsync status command implementation
//!
//! Runs a fetch and reports the pending changes without applying them.

use std::path::Path;

use serde::Serialize;

use crate::delta::Delta;
use crate::engine::{PendingChanges, SyncStatus};
use crate::error::Result;
use crate::output::{emit, HumanReport, OutputOptions};

use super::Session;

#[derive(Serialize)]
struct StatusReport {
    status: SyncStatus,
    tracked: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    fetch_error: Option<String>,
    pending: PendingChanges,
}

pub async fn run(root: &Path, verbose: bool, output: OutputOptions) -> Result<()> {
    let session = Session::open(root)?;
    let engine = &session.engine;

    let tracked = engine.load_tracked_documents().await?;
    let status = engine.fetch_delta().await?;
    let report = StatusReport {
        status,
        tracked,
        fetch_error: engine.last_fetch_error().await,
        pending: engine.pending().await,
    };

    let mut human = HumanReport::new("status", status.to_string());
    human
        .fact("vault", root.display().to_string())
        .fact("cards", tracked.to_string())
        .fact("lists", counts(&report.pending.collections))
        .fact("tasks", counts(&report.pending.items));

    if verbose {
        for line in describe_collections(&report.pending.collections)
            .into_iter()
            .chain(describe_items(&report.pending.items))
        {
            human.change(line);
        }
    }

    match (&report.fetch_error, status) {
        (Some(reason), _) => {
            human
                .warn(format!("fetch failed: {reason}"))
                .hint("check the remote service and token, then retry");
        }
        (None, SyncStatus::Pending { .. }) => {
            human.hint("cardsync sync");
        }
        _ => {}
    }

    emit(output, &report, &human)
}

fn counts<T>(delta: &Delta<T>) -> String {
    format!(
        "{} to pull, {} to push",
        delta.to_origin.len(),
        delta.to_remote.len()
    )
}

fn describe_collections(delta: &Delta<crate::collection::TaskCollection>) -> Vec<String> {
    let buckets = [
        ("pull new list", &delta.to_origin.add),
        ("pull list change", &delta.to_origin.modify),
        ("unlink list", &delta.to_origin.remove_id),
        ("create list", &delta.to_remote.add),
        ("push list change", &delta.to_remote.modify),
        ("delete list", &delta.to_remote.delete),
    ];
    buckets
        .into_iter()
        .flat_map(|(action, entries)| {
            entries
                .iter()
                .map(move |collection| format!("{action}: {}", collection.label()))
        })
        .collect()
}

fn describe_items(delta: &Delta<crate::task::TaskItem>) -> Vec<String> {
    let buckets = [
        ("pull new task", &delta.to_origin.add),
        ("pull task change", &delta.to_origin.modify),
        ("unlink task", &delta.to_origin.remove_id),
        ("create task", &delta.to_remote.add),
        ("push task change", &delta.to_remote.modify),
        ("delete task", &delta.to_remote.delete),
    ];
    buckets
        .into_iter()
        .flat_map(|(action, entries)| {
            entries.iter().map(move |item| {
                format!("{action}: {} ({})", item.title, item.parent.label())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::TaskCollection;
    use crate::task::TaskItem;

    #[test]
    fn describes_each_bucket() {
        let mut items = Delta::new();
        items.to_remote.add.push(TaskItem::new("Write tests"));
        items
            .to_origin
            .modify
            .push(TaskItem::new("Ship").with_id("t1"));
        let lines = describe_items(&items);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("pull task change: Ship"));
        assert!(lines[1].starts_with("create task: Write tests"));

        let mut lists = Delta::new();
        lists
            .to_remote
            .delete
            .push(TaskCollection::from_label("Work > Launch"));
        assert_eq!(
            describe_collections(&lists),
            vec!["delete list: Work > Launch".to_string()]
        );
    }
}
