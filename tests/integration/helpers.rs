//! Shared helpers for integration tests.

use davetjet::{App, AppConfig, AppParts, FileStore, ManualClock};
use davetjet_transport::{RecordingNotifier, ReqwestClient};
use std::path::Path;
use std::sync::Arc;

/// 2025-06-15T15:06:40Z.
pub(crate) const NOW: i64 = 1_750_000_000_000;
pub(crate) const HOUR: i64 = 60 * 60 * 1000;

/// A wired [`App`] over a temp-dir state file, a manual clock and a
/// recording notifier.
pub(crate) struct TestApp {
    pub app: App,
    pub clock: Arc<ManualClock>,
    pub notices: Arc<RecordingNotifier>,
    pub dir: tempfile::TempDir,
}

pub(crate) fn config_for(origin: Option<&str>) -> AppConfig {
    let mut config = AppConfig::default();
    config.intercept.origin = origin.map(str::to_owned);
    config
}

/// Build an app whose facade treats `origin` as same-site.
pub(crate) fn temp_app(origin: Option<&str>) -> TestApp {
    let dir = tempfile::tempdir().expect("create temp dir");
    let clock = Arc::new(ManualClock::new(NOW));
    let notices = Arc::new(RecordingNotifier::new());
    let app = app_on(dir.path(), config_for(origin), &clock, &notices);
    TestApp {
        app,
        clock,
        notices,
        dir,
    }
}

/// Build another app sharing the state file in `dir`, as after a restart.
pub(crate) fn app_on(
    dir: &Path,
    config: AppConfig,
    clock: &Arc<ManualClock>,
    notices: &Arc<RecordingNotifier>,
) -> App {
    let parts = AppParts {
        store: Arc::new(FileStore::new(dir.join("state.json"))),
        clock: clock.clone(),
        notifier: notices.clone(),
        client: Arc::new(ReqwestClient::new(None).expect("build reqwest client")),
    };
    App::new(config, parts).expect("wire app")
}
