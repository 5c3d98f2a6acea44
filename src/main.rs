use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::{Context, eyre};
use etcetera::BaseStrategy;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info};

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::system::System;

mod artwork;
mod cli;
mod config;
mod mpd_client;
mod mpd_protocol;
mod playlist;
mod scan;
mod system;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    setup_tracing();

    let options = Cli::parse();
    let config = Config::load(&options.config).wrap_err("Could not load configuration")?;

    let music_dir = config
        .library
        .music_directory
        .clone()
        .ok_or_else(|| eyre!("library.music_directory is not configured"))?;
    let playlist_dir = config.playlist_dir(&music_dir);

    let dirs = etcetera::choose_base_strategy()?;
    let db_path = dirs.cache_dir().join("mpdgate").join("database.sqlite");
    let db_path = Utf8PathBuf::from_path_buf(db_path)
        .map_err(|p| eyre!("cache dir is not UTF-8: {}", p.display()))?;

    let mut system = System::new(Some(&db_path), music_dir, playlist_dir, config.speakers())
        .wrap_err("Could not start system")?;

    match options.command {
        Commands::Scan => system.rescan_now().wrap_err("Scan failed")?,
        Commands::Run => {
            if config.mpd.port <= 0 {
                info!("mpd not enabled");
                return Ok(());
            }
            let port = u16::try_from(config.mpd.port).wrap_err("mpd.port out of range")?;

            system.rescan_now().wrap_err("Initial scan failed")?;
            let rescan_rx = system
                .take_rescan_rx()
                .ok_or_else(|| eyre!("rescan channel already taken"))?;

            let system = Arc::new(Mutex::new(system));
            let config = Arc::new(config);

            tokio::task::spawn(rescan_worker(Arc::clone(&system), rescan_rx));

            if config.mpd.http_port > 0 {
                let system = Arc::clone(&system);
                let http_port = config.mpd.http_port;
                tokio::task::spawn(async move {
                    if let Err(e) = artwork::serve(system, http_port).await {
                        error!("artwork endpoint failed: {e:#}");
                    }
                });
            }

            mpd_client::handle_clients(system, Arc::clone(&config), port).await?;
        }
    }

    Ok(())
}

/// Runs queued rescans off the connection path; the filesystem walk happens
/// on a blocking thread, only the database sync takes the system lock.
async fn rescan_worker(system: Arc<Mutex<System>>, mut rx: mpsc::UnboundedReceiver<()>) {
    while rx.recv().await.is_some() {
        let music_dir = system.lock().await.music_dir.clone();
        let files = match tokio::task::spawn_blocking(move || scan::collect(&music_dir)).await {
            Ok(files) => files,
            Err(e) => {
                error!("scan task failed: {e}");
                continue;
            }
        };
        if let Err(e) = system.lock().await.apply_scan(files) {
            error!("rescan failed: {e:#}");
        }
    }
}

pub fn setup_tracing() {
    use tracing_subscriber::filter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = filter::EnvFilter::builder().from_env_lossy();
    let fmt = fmt::layer().with_line_number(true);

    let _ignore_err = tracing_subscriber::registry()
        .with(fmt)
        .with(filter)
        .try_init();
}
