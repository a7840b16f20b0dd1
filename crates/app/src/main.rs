use anyhow::{Context, bail};
use clap::Parser;
use serde_json::json;
use services::{AppServices, Clock, HttpProgressConfig};
use tracing_subscriber::EnvFilter;

mod config;

use config::{Cli, Command, DEFAULT_LOG_FILTER, normalize_sqlite_url};

fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid log filter")?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn print(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    let clock = Clock::default();
    let config = cli.policies.engine_config();
    let db_url = normalize_sqlite_url(&cli.db_url);
    let services = match &cli.api_url {
        Some(base_url) => {
            let remote = HttpProgressConfig {
                base_url: base_url.clone(),
                token: cli.api_token.clone(),
            };
            AppServices::new_remote(&db_url, remote, clock, config).await?
        }
        None => AppServices::new_sqlite(&db_url, clock, config).await?,
    };
    tracing::debug!(db_url = %db_url, remote = cli.api_url.is_some(), "services ready");

    run(&services, cli.command).await
}

async fn run(services: &AppServices, command: Command) -> anyhow::Result<()> {
    let progress = services.progress();
    match command {
        Command::Status { user, workshop } => {
            let session = progress.open_session(user, workshop).await;
            print(&json!({ "record": session.record(), "pending": session.is_pending() }))
        }
        Command::Complete { user, step } => {
            let mut session = progress.open_session(user, step.workshop()).await;
            let changed = progress.mark_step_completed(&mut session, &step).await?;
            print(&json!({
                "changed": changed,
                "record": session.record(),
                "pending": session.is_pending(),
            }))
        }
        Command::Visit { user, step } => {
            let mut session = progress.open_session(user, step.workshop()).await;
            let changed = progress.update_current_step(&mut session, &step).await?;
            print(&json!({
                "changed": changed,
                "record": session.record(),
                "pending": session.is_pending(),
            }))
        }
        Command::Video {
            user,
            step,
            percent,
            position,
        } => {
            let mut session = progress.open_session(user, step.workshop()).await;
            let changed = progress
                .update_video_progress(&mut session, &step, percent, position)
                .await?;
            print(&json!({
                "changed": changed,
                "videoProgress": session.record().video_progress(&step),
                "videoPosition": session.record().video_position(&step),
                "pending": session.is_pending(),
            }))
        }
        Command::Record {
            user,
            kind,
            payload,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("payload must be JSON")?;
            let artifact = services.assessments().record(user, kind, payload).await?;
            print(&serde_json::to_value(&artifact)?)
        }
        Command::Assessments { user } => {
            let set = services.assessments().list(user).await?;
            let artifacts: Vec<_> = set.iter().collect();
            print(&serde_json::to_value(artifacts)?)
        }
        Command::Reset { user } => {
            let report = services.reset().reset_user_data(user).await?;
            print(&serde_json::to_value(report)?)
        }
        Command::MigrateLegacy => {
            let Some(repo) = services.sqlite() else {
                bail!("legacy migration needs the SQLite backend");
            };
            let report = repo.migrate_legacy_progress().await?;
            print(&serde_json::to_value(report)?)
        }
    }
}
