//! Tile Loader - load tiles from an image directory in priority order.
//!
//! This binary requests tiles, reports each one as it becomes ready and then
//! shuts the loader down.

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_loader::{
    config::Config, ChannelObserver, ImageDirSource, ObjectKey, TileCollection, TileEntry,
    TileObserver,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let keys = match parse_keys(&config.keys) {
        Ok(keys) => keys,
        Err(e) => {
            error!("Invalid tile key: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let loader_config = config.loader_config();

    info!("Configuration:");
    info!("  Image directory: {}", config.image_dir.display());
    info!(
        "  Tiles: {}x{} px, {} channel(s)",
        loader_config.tile_size,
        loader_config.tile_size,
        loader_config.channel_count()
    );
    info!("  Priority: {}", config.priority);
    if loader_config.use_imaging_backend {
        info!("  Imaging backend: enabled");
    }

    let source = ImageDirSource::from_config(&config.image_dir, &loader_config);
    let tiles = match TileCollection::new(loader_config, source) {
        Ok(tiles) => Arc::new(tiles),
        Err(e) => {
            error!("Failed to start tile loader: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (observer, mut events) = ChannelObserver::new();
    let observer: Arc<dyn TileObserver> = observer;

    let entries = tiles.get_tiles(&keys, &observer, config.priority, config.whole_image);
    // Every distinct key is new to this process, so each gets exactly one event
    let mut outstanding: HashSet<ObjectKey> = keys.iter().cloned().collect();

    info!("Requested {} tile(s), {} queued", keys.len(), tiles.queue_len());

    let wait = Duration::from_secs(config.wait_secs);
    let deadline = tokio::time::Instant::now() + wait;

    while !outstanding.is_empty() {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(event)) => {
                if !outstanding.remove(&event.key) {
                    continue;
                }
                if let Some(entry) = entries.iter().find(|e| e.key() == &event.key) {
                    print_tile(entry);
                }
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    "Gave up after {}s with {} tile(s) still loading",
                    config.wait_secs,
                    outstanding.len()
                );
                break;
            }
        }
    }

    tiles.abort();
    let joined = tokio::task::spawn_blocking(move || tiles.join()).await;
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Failed to wait for tile loader: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if outstanding.is_empty() {
        ExitCode::SUCCESS
    } else {
        for key in &outstanding {
            warn!("  not loaded: {}", key);
        }
        ExitCode::FAILURE
    }
}

/// Parse `<source>:<x>:<y>` arguments.
fn parse_keys(raw: &[String]) -> Result<Vec<ObjectKey>, String> {
    raw.iter().map(|s| s.parse::<ObjectKey>()).collect()
}

/// Print one JSON line describing a loaded tile.
fn print_tile(entry: &TileEntry) {
    let channels = entry.channels();
    let means: Vec<f32> = channels.iter().map(|c| c.mean()).collect();
    let (width, height) = channels
        .first()
        .map(|c| c.dimensions())
        .unwrap_or((0, 0));

    let json = serde_json::json!({
        "key": entry.key(),
        "width": width,
        "height": height,
        "channel_means": means,
    });
    println!("{}", json);
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_loader=debug"
    } else {
        "tile_loader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
