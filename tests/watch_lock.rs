mod support;

use std::sync::Arc;
use std::time::Duration;

use cardsync::config::Config;
use cardsync::engine::{EngineSettings, SyncEngine};
use cardsync::lock::FileLock;
use cardsync::watch::{self, WatchOptions, WATCH_LOCK};
use cardsync::Error;
use support::{FakeRemote, TestVault};

fn watch_engine(vault: &TestVault) -> Arc<SyncEngine> {
    Arc::new(SyncEngine::new(
        Arc::new(vault.vault.clone()),
        Arc::new(FakeRemote::default()),
        EngineSettings::default(),
    ))
}

fn options() -> WatchOptions {
    WatchOptions {
        sync_enabled: false,
        ..WatchOptions::from_config(&Config::default())
    }
}

#[tokio::test]
async fn second_watcher_is_refused() {
    let vault = TestVault::new();
    let _held = FileLock::acquire(vault.path().join(WATCH_LOCK), 1_000).expect("hold lock");

    let result = watch::run(watch_engine(&vault), &vault.vault, options(), async {}).await;
    assert!(matches!(result, Err(Error::LockFailed(_))));
}

#[tokio::test]
async fn watch_stops_on_shutdown_and_releases_lock() {
    let vault = TestVault::new();
    vault.write_card("Inbox.md", "- [ ] Call back\n");
    let engine = watch_engine(&vault);

    let shutdown = tokio::time::sleep(Duration::from_millis(100));
    watch::run(engine.clone(), &vault.vault, options(), shutdown)
        .await
        .expect("watch runs");

    let relock = FileLock::try_acquire(vault.path().join(WATCH_LOCK)).expect("probe lock");
    assert!(relock.is_some());
    assert!(engine.jobs().is_empty());
}
