//! Drive the request layer and the onboarding checklist from the command line.
//!
//! Configuration is read from the default config path; state lives in the
//! configured state file.

use anyhow::Context as _;
use davetjet::{App, AppConfig, SnoozePreset, TaskAction};
use davetjet_transport::{OutgoingRequest, topics};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries command output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        return Ok(());
    };
    if matches!(command.as_str(), "help" | "--help" | "-h") {
        print_usage();
        return Ok(());
    }

    let config_path = AppConfig::default_config_path();
    let app = App::from_path(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    match (command.as_str(), &args[1..]) {
        ("fetch", [url]) => fetch(&app, "GET", url).await,
        ("fetch", [url, method]) => fetch(&app, method, url).await,
        ("tasks", [page]) => show_tasks(&app, page),
        ("done", [id]) => apply(&app, id, TaskAction::Complete),
        ("snooze", [id, code]) => apply(&app, id, TaskAction::Snooze(SnoozePreset::parse_lenient(code))),
        ("tour-ended", [page]) => {
            let delivered = app
                .bus()
                .emit(topics::TOUR_ENDED, &json!({ "skipped": false, "page": page }));
            tracing::debug!(delivered, "tour-ended published");
            show_tasks(&app, page)
        }
        (other, rest) => {
            print_usage();
            anyhow::bail!("unknown command `{other}` with {} argument(s)", rest.len())
        }
    }
}

async fn fetch(app: &App, method: &str, url: &str) -> anyhow::Result<()> {
    let response = app
        .fetch(OutgoingRequest::new(method, url))
        .await
        .map_err(|failure| anyhow::anyhow!("{}: {}", failure.kind, failure.message))?;
    println!("{} {}", response.status, response.status_text);
    println!("{}", response.text());
    Ok(())
}

fn show_tasks(app: &App, page: &str) -> anyhow::Result<()> {
    let mut engine = app.tasks()?;
    let badge = engine.refresh_badge()?;
    let drawer = engine.drawer(page);
    println!("{}", serde_json::to_string_pretty(&json!({
        "drawer": drawer,
        "badge": badge,
    }))?);
    Ok(())
}

fn apply(app: &App, id: &str, action: TaskAction) -> anyhow::Result<()> {
    let effect = app.tasks()?.dispatch(id, action)?;
    println!("{}", serde_json::to_string(&effect)?);
    Ok(())
}

fn print_usage() {
    println!(
        "usage: davetjet-cli <command>\n\
         \n\
         commands:\n  \
           fetch <url> [method]     perform a call through the facade\n  \
           tasks <page>             show the task drawer for a page\n  \
           done <task-id>           mark a task done\n  \
           snooze <task-id> <code>  snooze a task (1h, 1d, 7d, pre7)\n  \
           tour-ended <page>        record a finished tour for a page"
    );
}
