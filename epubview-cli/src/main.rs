mod scenario;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use epubview_core::SessionConfig;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::scenario::Scenario;

#[derive(Debug, Parser)]
#[command(
    name = "epubview",
    version,
    about = "Replays reader scenarios against an EPUB session controller"
)]
struct Args {
    /// Scenario file: renderer script plus the steps to run
    scenario: PathBuf,

    /// Session config (TOML); overrides the scenario's own config
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Directory for the log file
    #[arg(long = "log-dir")]
    log_dir: Option<PathBuf>,

    /// Pretty-print each record
    #[arg(long)]
    pretty: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "epubview", "epubview")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let log_dir = args
        .log_dir
        .clone()
        .unwrap_or_else(|| project_dirs.data_local_dir().join("logs"));
    let _log_guard = init_logging(&log_dir)?;

    let mut scenario = Scenario::load(&args.scenario)?;
    let config = resolve_config(
        args.config.as_deref(),
        scenario.config.take(),
        &project_dirs.config_dir().join("config.toml"),
    )?;
    info!(scenario = ?args.scenario, ?config, "starting replay");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    scenario::replay(scenario, config, &mut out, args.pretty)
        .await
        .with_context(|| format!("failed to replay {:?}", args.scenario))
}

/// Explicit `--config` wins, then the scenario's config, then the user's
/// config file when one exists.
fn resolve_config(
    explicit: Option<&Path>,
    from_scenario: Option<SessionConfig>,
    user_config: &Path,
) -> Result<SessionConfig> {
    if let Some(path) = explicit {
        return SessionConfig::load(path);
    }
    if let Some(config) = from_scenario {
        return Ok(config);
    }
    if user_config.exists() {
        debug!(path = ?user_config, "using user config");
        return SessionConfig::load(user_config);
    }
    Ok(SessionConfig::default())
}

fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "epubview.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // stdout carries the records
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn explicit_config_beats_the_scenario() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "auto-toc = true\n").unwrap();
        let from_scenario = SessionConfig {
            auto_pagination: true,
            ..SessionConfig::default()
        };

        let config = resolve_config(
            Some(&path),
            Some(from_scenario),
            &dir.path().join("missing.toml"),
        )
        .unwrap();

        assert!(config.auto_toc);
        assert!(!config.auto_pagination);
    }

    #[test]
    fn user_config_is_the_fallback() {
        let dir = tempdir().unwrap();
        let user = dir.path().join("config.toml");
        assert_eq!(
            resolve_config(None, None, &user).unwrap(),
            SessionConfig::default()
        );

        fs::write(&user, "padding = \"0 24px\"\n").unwrap();
        let config = resolve_config(None, None, &user).unwrap();
        assert_eq!(config.padding.as_deref(), Some("0 24px"));
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from(["epubview", "run.json", "-c", "s.toml", "--pretty"])
            .unwrap();
        assert_eq!(args.scenario, PathBuf::from("run.json"));
        assert_eq!(args.config, Some(PathBuf::from("s.toml")));
        assert!(args.pretty);
    }
}
