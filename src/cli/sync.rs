//! cardsync sync command implementation

use std::path::Path;

use serde::Serialize;

use crate::engine::{SyncReport, SyncStatus};
use crate::error::{Error, Result};
use crate::output::{emit, HumanReport, OutputOptions};

use super::Session;

#[derive(Serialize)]
struct SyncOutcome {
    fetched: SyncStatus,
    report: SyncReport,
    status: SyncStatus,
}

pub async fn run(root: &Path, output: OutputOptions) -> Result<()> {
    let session = Session::open(root)?;
    let engine = &session.engine;

    let fetched = engine.fetch_delta().await?;
    if fetched == SyncStatus::Error {
        let reason = engine.last_fetch_error().await.unwrap_or_default();
        return Err(Error::OperationFailed(format!("fetch failed: {reason}")));
    }

    let report = if fetched == SyncStatus::Synced {
        SyncReport::default()
    } else {
        engine.sync_task_lists_and_tasks().await?
    };
    // A sync only applies what was known; report anything still outstanding.
    let status = engine.fetch_delta().await?;

    let outcome = SyncOutcome {
        fetched,
        report,
        status,
    };

    let summary = if fetched == SyncStatus::Synced {
        "already in sync".to_string()
    } else {
        format!("applied {} change(s)", report.applied)
    };
    let mut human = HumanReport::new("sync", summary);
    human
        .fact("vault", root.display().to_string())
        .status("before", fetched)
        .status("after", status)
        .sync_report(&report);
    if matches!(status, SyncStatus::Pending { .. }) {
        human.hint("cardsync sync");
    }

    emit(output, &outcome, &human)
}
