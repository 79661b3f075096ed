//! cardsync watch command implementation

use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::output::{emit, HumanReport, OutputOptions};
use crate::watch::{self, WatchOptions};

use super::Session;

#[derive(Serialize)]
struct WatchReport {
    sync_enabled: bool,
    fetch_interval_ms: u64,
    status: crate::engine::SyncStatus,
}

pub async fn run(root: &Path, output: OutputOptions) -> Result<()> {
    let session = Session::open(root)?;
    let options = WatchOptions::from_config(&session.config);

    if !output.json && !output.quiet {
        println!("cardsync watch: watching {} (Ctrl-C to stop)", root.display());
    }

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    watch::run(session.engine.clone(), &session.vault, options.clone(), shutdown).await?;

    let status = session.engine.status().await;
    let report = WatchReport {
        sync_enabled: options.sync_enabled,
        fetch_interval_ms: options.fetch_interval.as_millis() as u64,
        status,
    };
    let mut human = HumanReport::new("watch", "stopped");
    human.status("status", status);
    if !options.sync_enabled {
        human.warn("sync.enabled is false; only local changes were tracked");
    }

    emit(output, &report, &human)
}
