use cardsync::engine::{SyncReport, SyncStatus};
use cardsync::output::{render, HumanReport};

#[test]
fn render_aligns_facts_and_lists_changes() {
    let mut human = HumanReport::new("status", "↓1 ↑1");
    human
        .fact("vault", "/tmp/vault")
        .fact("cards", "2")
        .status("now", SyncStatus::Synced)
        .change("create task: Draft plan (Work > Launch)")
        .hint("cardsync sync");

    let rendered = render(&human);
    assert_eq!(
        rendered,
        "cardsync status: ↓1 ↑1\n  vault  /tmp/vault\n  cards  2\n  now    synced\n\n  create task: Draft plan (Work > Launch)\n\nhint: cardsync sync"
    );
}

#[test]
fn sync_report_warns_about_skips_and_failures() {
    let mut human = HumanReport::new("sync", "applied 2 change(s)");
    human.sync_report(&SyncReport {
        applied: 2,
        skipped: 1,
        failed: 3,
    });

    let rendered = render(&human);
    assert!(rendered.contains("warning: 1 change(s) skipped because their card or list is gone"));
    assert!(rendered.contains("warning: 3 change(s) failed, see logs"));
    assert!(rendered.contains("hint: RUST_LOG=cardsync=debug cardsync sync"));
}

#[test]
fn render_without_extras_is_one_line() {
    let human = HumanReport::new("init", "nothing to do");
    assert_eq!(render(&human), "cardsync init: nothing to do");
}
