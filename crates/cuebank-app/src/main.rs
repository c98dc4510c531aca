//! # cuebank
//!
//! Plays one cue from a cuebank project on the default audio device.
//!
//! ```text
//! cuebank <manifest.json> <cue> [config.json]
//! ```

mod player;

use std::path::Path;

use anyhow::{bail, Context, Result};
use cuebank_audio::{EngineConfig, OutputDevice, StopOptions};
use cuebank_core::ProjectManifest;
use player::Player;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: cuebank <manifest.json> <cue> [config.json]";

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cuebank=info,cuebank_audio=info".into()),
        )
        .init();

    info!("Starting cuebank v{}", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (manifest_path, cue, config_path) = match args.as_slice() {
        [manifest, cue] => (manifest, cue, None),
        [manifest, cue, config] => (manifest, cue, Some(config)),
        _ => bail!(USAGE),
    };

    let config = match config_path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => EngineConfig::default(),
    };

    let manifest_path = Path::new(manifest_path);
    let manifest = ProjectManifest::load(manifest_path)
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;
    let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let output = OutputDevice::start(&config.output).context("Failed to open audio output")?;
    let player = Player::load(output.clone(), &manifest, base_dir, &config)?;

    let result = player.play_until_stopped(cue);

    player.engine().stop_all(StopOptions::Immediate);
    drop(player);
    output.shutdown();
    result.map(|_| ())
}
