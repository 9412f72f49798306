//! Cooldown guard wired to the app's store and notifier.

use crate::helpers::{app_on, config_for, temp_app};

#[tokio::test]
async fn cooldown_blocks_repeat_and_warns_once() {
    let t = temp_app(None);
    let guard = t.app.cooldown();

    let first = guard.run("resend", 30_000, || async { 1 }).await;
    assert_eq!(first.unwrap(), 1);

    t.clock.advance(10_000);
    let rejected = guard.run("resend", 30_000, || async { 2 }).await;
    assert_eq!(rejected.unwrap_err().remaining_ms(), 20_000);
    assert!(guard.run("resend", 30_000, || async { 3 }).await.is_err());

    let warnings = t.notices.matching("Please wait");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "Please wait: 20 s");
    assert_eq!(guard.countdown_label("resend", Some("Retry in %s s")).as_deref(), Some("Retry in 20 s"));
}

#[test]
fn cooldown_survives_restart() {
    let t = temp_app(None);
    t.app.cooldown().set("export", 60_000).unwrap();

    let restarted = app_on(t.dir.path(), config_for(None), &t.clock, &t.notices);
    assert_eq!(restarted.cooldown().remaining("export"), 60_000);
    t.clock.advance(60_000);
    assert!(!restarted.cooldown().is_cooling("export"));
}
