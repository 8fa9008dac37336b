//! H.A.R.P.E.R. binary: connects to IRC and serves commands until an owner
//! logs it out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use harper_sdk::client::{self, ConnectConfig, ReconnectConfig};
use tracing_subscriber::EnvFilter;

use harper_bot::bot::{self, BotState};
use harper_bot::config::{Args, Config};
use harper_bot::db::Db;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs when HARPER_LOG_JSON=1, human-readable otherwise
    let json_logs = std::env::var("HARPER_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "harper_bot=info,harper_sdk=info".into());
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::from_args(Args::parse())?;

    if let Some(parent) = config.db.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db = Db::open(&config.db)
        .with_context(|| format!("Failed to open database {}", config.db.display()))?;

    tracing::info!(
        server = %config.server,
        nick = %config.nick,
        channels = ?config.channels,
        version = %config.version,
        "Starting H.A.R.P.E.R."
    );

    let connect = ConnectConfig {
        server_addr: config.server.clone(),
        nick: config.nick.clone(),
        user: config.nick.clone(),
        realname: "H.A.R.P.E.R. homework bot".to_string(),
        tls: config.tls,
        tls_insecure: config.tls_insecure,
    };
    let reconnect = ReconnectConfig {
        channels: config.channels.clone(),
        ..Default::default()
    };

    let state = Arc::new(BotState::new(config, db));
    tokio::spawn(bot::run_status_rotation(state.clone()));

    let handler_state = state.clone();
    client::run_with_reconnect(connect, reconnect, move |handle, event| {
        let state = handler_state.clone();
        Box::pin(async move { bot::handle_event(&state, handle, event).await })
    })
    .await?;

    // Give the connection task a moment to flush QUIT.
    tokio::time::sleep(Duration::from_millis(500)).await;
    tracing::info!("{} was logged out", state.bot_nick());
    Ok(())
}
