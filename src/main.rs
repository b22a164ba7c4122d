use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;

mod client;
mod condition;
mod config;
mod connection;
mod decay_timer;
mod error;
mod fields;
mod fighter;
mod input;
mod logger;
mod outbox;
mod phase;
mod protocol;
mod render;
mod session;

use client::Client;
use config::{load_config, DEFAULT_CONFIG_PATH};
use render::LogRenderer;
use session::InputEvent;

const INPUT_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // First argument overrides the config path
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = load_config(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    logger::init_logger(&config.tracing);

    info!(
        { fields::CONFIG_SOURCE } = %path.display(),
        { fields::ADDR } = %config.client.endpoint(),
        { fields::LOCAL_COLOR } = %config.client.player_color,
        tracing_format = ?config.tracing.format,
        tracing_level = config.tracing.level.as_str(),
        punch_decay_ms = config.timing.punch_decay_ms,
        "Client configuration loaded"
    );

    let (client, snapshots) = Client::new(&config);
    tokio::spawn(render::drive_renderer(snapshots, LogRenderer::default()));

    let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    // The configured color is the first selection.
    input_tx
        .send(InputEvent::SelectColor(config.client.player_color))
        .await?;
    tokio::spawn(input::read_commands(input_tx));

    client.run(input_rx).await
}
