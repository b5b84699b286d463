// Desktop Scrobbler
// Watches an MPRIS or MPD player and scrobbles what it plays to Last.fm

mod config;
mod history;
mod media_monitor;
mod play_session;
mod player;
mod scrobbler;
mod supervisor;
mod text_cleanup;
mod track;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Backend, Config};
use history::ScrobbleHistory;
use log::LevelFilter;
use media_monitor::MediaMonitor;
use play_session::SessionSettings;
use player::mpd::MpdPlayer;
use player::mpris::MprisPlayer;
use player::{Player, Watcher};
use scrobbler::lastfm::LastFmScrobbler;
use scrobbler::{lastfm_auth, Normalizer, Scrobbler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log every decision and server response
    #[arg(long)]
    debug: bool,

    /// Path to config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// `RUST_LOG` sets the baseline, `--debug` raises this crate to debug
fn init_logger(args: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if args.debug {
        logger.filter_module(module_path!(), LevelFilter::Debug);
    }

    logger.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args);

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !config_path.exists() {
        Config::default()
            .save(&config_path)
            .with_context(|| format!("Failed to create new config at {:?}", config_path))?;
        tokio::task::spawn_blocking(move || lastfm_auth::offer_api_account(&config_path))
            .await??;
        return Ok(());
    }

    let mut config = Config::load(&config_path).context("Couldn't read config")?;

    if config.lastfm.session_key.is_empty() {
        let api_key = config.lastfm.api_key.clone();
        let api_secret = config.lastfm.api_secret.clone();
        config.lastfm.session_key =
            tokio::task::spawn_blocking(move || lastfm_auth::authenticate(&api_key, &api_secret))
                .await??;
        config
            .save(&config_path)
            .context("Failed to write config file")?;
        println!(
            "Your session key was added to {:?}. Reauthorization is necessary if lost.",
            config_path
        );
    }

    let scrobbler = Arc::new(
        LastFmScrobbler::new(config.lastfm.api_key.clone(), config.lastfm.api_secret.clone())
            .with_session_key(config.lastfm.session_key.clone()),
    );

    match config.player.backend {
        Backend::Mpris => {
            let player = MprisPlayer::connect().await?;
            run(Arc::new(player), scrobbler, &config).await
        }
        Backend::Mpd => {
            let player = MpdPlayer::connect(config.player.mpd.clone()).await?;
            run(Arc::new(player), scrobbler, &config).await
        }
    }
}

/// Wire the watcher to the media monitor and run until Ctrl-C or until the
/// player is lost for good
async fn run<P: Player, S: Scrobbler>(player: Arc<P>, scrobbler: Arc<S>, config: &Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(16);

    let watcher = Watcher::new(Arc::clone(&player), config.poll_interval());
    let mut watcher_task = tokio::spawn(watcher.run(events_tx, shutdown.clone()));

    let settings = SessionSettings {
        interval: config.poll_interval(),
        history: config
            .player
            .backend
            .suppresses_duplicates()
            .then(ScrobbleHistory::default),
    };
    let monitor = MediaMonitor::new(
        player,
        scrobbler,
        Normalizer::from_config(config),
        settings,
        shutdown.child_token(),
    );
    let monitor_task = tokio::spawn(monitor.run(events_rx, shutdown.clone()));

    log::info!("Watching {:?} player", config.player.backend);

    let result = tokio::select! {
        biased;

        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            log::info!("Shutting down gracefully");
            Ok(())
        }

        result = &mut watcher_task => result.context("Player watcher panicked")?,
    };

    shutdown.cancel();
    monitor_task.await.context("Media monitor panicked")?;

    result
}
