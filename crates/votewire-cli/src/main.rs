//! # votewire
//!
//! Command-line client: watch an event's live vote counts, or cast a vote.

#![deny(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use votewire_client::{
    ClientConfig, ConnectionManager, ConnectionStatus, ResourceId, StompTransport, Supervisor,
    VoteUpdate,
};
use votewire_core::constants::VOTE_DESTINATION;
use votewire_settings::{VotewireSettings, load_settings_from_path, resolve_api_base, settings_path};

/// Live vote-count client.
#[derive(Parser, Debug)]
#[command(name = "votewire", version, about = "Live vote-count client")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// REST API base; the broker endpoint is derived from it.
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Settings file (defaults to `~/.votewire/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream vote updates for an event as JSON lines until interrupted.
    Watch {
        /// Event to watch.
        event_id: String,
    },
    /// Cast one vote and exit.
    Send {
        /// Event to vote in.
        event_id: String,

        /// Candidate to vote for.
        #[arg(long)]
        candidate_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.common.settings.clone().unwrap_or_else(settings_path);
    let settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    let level = cli
        .common
        .log_level
        .as_deref()
        .unwrap_or(&settings.logging.level);
    votewire_core::logging::init_subscriber(level);

    let config = client_config(&cli.common, &settings)?;
    tracing::debug!(endpoint = %config.endpoint, "resolved broker endpoint");

    match cli.command {
        Command::Watch { event_id } => watch(config, &settings, event_id.into()).await,
        Command::Send {
            event_id,
            candidate_id,
        } => send(config, event_id.into(), candidate_id.into()).await,
    }
}

fn client_config(common: &CommonArgs, settings: &VotewireSettings) -> Result<ClientConfig> {
    let api_base = resolve_api_base(common.api_base.as_deref(), &settings.client);
    ClientConfig::from_settings(&api_base, &settings.client)
        .with_context(|| format!("Invalid API base: {api_base}"))
}

async fn watch(
    config: ClientConfig,
    settings: &VotewireSettings,
    event_id: ResourceId,
) -> Result<()> {
    let manager = ConnectionManager::new(config, Arc::new(StompTransport::new()));
    manager.on_message(|payload| {
        if let Ok(update) = VoteUpdate::from_value(&payload) {
            tracing::debug!(
                candidate = ?update.candidate_id,
                total_votes = ?update.total_votes,
                "vote update"
            );
        }
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{payload}");
    });
    manager.on_connection_error(|err| tracing::warn!(error = %err, "connection error"));

    let _ = manager.connect(event_id.clone()).await?;

    let cancel = CancellationToken::new();
    let supervisor = Supervisor::new(manager.clone(), event_id)
        .spawn(settings.client.supervisor_interval(), cancel.clone());

    let mut status = manager.watch_status();
    let status_log = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let snapshot = status.borrow_and_update().clone();
            tracing::info!(
                status = %snapshot.status,
                attempts = snapshot.attempt_count,
                "status changed"
            );
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    cancel.cancel();
    supervisor.await.context("Supervisor task failed")?;
    status_log.abort();
    Ok(())
}

async fn send(config: ClientConfig, event_id: ResourceId, candidate_id: ResourceId) -> Result<()> {
    let connect_timeout = config.connect_timeout;
    let manager = ConnectionManager::new(config, Arc::new(StompTransport::new()));
    let _ = manager.connect(event_id.clone()).await?;

    let connected = tokio::time::timeout(
        connect_timeout,
        manager.wait_for_status(ConnectionStatus::Connected),
    )
    .await;
    if !matches!(connected, Ok(Ok(()))) {
        manager.disconnect().await;
        bail!("Could not connect to {}", manager.endpoint());
    }

    let vote = VoteUpdate::vote_added(event_id, candidate_id);
    let result = manager.send(VOTE_DESTINATION, &vote).await;
    manager.disconnect().await;
    result.context("Failed to send vote")?;

    tracing::info!("vote sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch() {
        let cli = Cli::try_parse_from(["votewire", "watch", "42"]).unwrap();
        assert!(matches!(cli.command, Command::Watch { ref event_id } if event_id == "42"));
        assert!(cli.common.api_base.is_none());
    }

    #[test]
    fn parses_send_with_global_flags() {
        let cli = Cli::try_parse_from([
            "votewire",
            "send",
            "42",
            "--candidate-id",
            "7",
            "--api-base",
            "https://votes.example/api",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Send { ref event_id, ref candidate_id } if event_id == "42" && candidate_id == "7"
        ));
        assert_eq!(cli.common.api_base.as_deref(), Some("https://votes.example/api"));
    }

    #[test]
    fn send_requires_candidate() {
        assert!(Cli::try_parse_from(["votewire", "send", "42"]).is_err());
    }

    #[test]
    fn explicit_api_base_wins() {
        let common = CommonArgs {
            api_base: Some("https://votes.example/api".into()),
            settings: None,
            log_level: None,
        };
        let config = client_config(&common, &VotewireSettings::default()).unwrap();
        assert_eq!(config.endpoint.as_str(), "https://votes.example/ws");
    }

    #[test]
    fn settings_api_base_used_when_no_flag() {
        let common = CommonArgs {
            api_base: None,
            settings: None,
            log_level: None,
        };
        let mut settings = VotewireSettings::default();
        settings.client.api_base = "http://10.0.0.5:9000/api".into();
        settings.client.max_reconnect_attempts = 3;
        let config = client_config(&common, &settings).unwrap();
        assert_eq!(config.endpoint.as_str(), "http://10.0.0.5:9000/ws");
        assert_eq!(config.max_reconnect_attempts, 3);
    }

    #[test]
    fn invalid_api_base_is_reported() {
        let common = CommonArgs {
            api_base: Some("ftp://votes.example/api".into()),
            settings: None,
            log_level: None,
        };
        let err = client_config(&common, &VotewireSettings::default()).unwrap_err();
        assert!(err.to_string().contains("Invalid API base"));
    }

    #[test]
    fn settings_file_feeds_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"client":{"reconnectDelayMs":250}}"#).unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        let common = CommonArgs {
            api_base: None,
            settings: Some(path),
            log_level: None,
        };
        let config = client_config(&common, &settings).unwrap();
        assert_eq!(config.reconnect_delay, std::time::Duration::from_millis(250));
    }
}
