// Media monitoring module
// Consumes player change events, announces new tracks and starts play sessions

use crate::play_session::{ScrobbleSession, SessionSettings};
use crate::player::{Player, PlayerEvent};
use crate::scrobbler::{Normalizer, Scrobbler};
use crate::supervisor::SessionSupervisor;
use crate::track::Snapshot;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Remembers the last announced track and reports identity changes
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Snapshot,
}

impl ChangeDetector {
    /// Returns `true` when `snapshot` is a different track than the last one
    /// announced, which it then becomes. Play/pause of the same track is not
    /// a change.
    pub fn observe(&mut self, snapshot: &Snapshot) -> bool {
        if self.last.same_track(snapshot) {
            return false;
        }
        self.last = snapshot.clone();
        true
    }
}

pub struct MediaMonitor<P, S> {
    player: Arc<P>,
    scrobbler: Arc<S>,
    normalizer: Normalizer,
    settings: SessionSettings,
    detector: ChangeDetector,
    supervisor: SessionSupervisor,
}

impl<P: Player, S: Scrobbler> MediaMonitor<P, S> {
    pub fn new(
        player: Arc<P>,
        scrobbler: Arc<S>,
        normalizer: Normalizer,
        settings: SessionSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            player,
            scrobbler,
            normalizer,
            settings,
            detector: ChangeDetector::default(),
            supervisor: SessionSupervisor::new(cancel),
        }
    }

    /// Process events in arrival order until the watcher hangs up or `cancel`
    /// fires, then wind down the running sessions
    pub async fn run(mut self, mut events: mpsc::Receiver<PlayerEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Some(PlayerEvent::Changed {
                    snapshot,
                    sampled_at,
                }) => {
                    self.handle(snapshot, sampled_at).await;
                }
                None => break,
            }
        }

        log::debug!("Stopping {} play session(s)", self.supervisor.live().len());
        self.supervisor.shutdown().await;
    }

    /// React to a snapshot read at `sampled_at`. Returns `true` when a play
    /// session was started for it.
    pub async fn handle(&mut self, snapshot: Snapshot, sampled_at: Instant) -> bool {
        if !self.detector.observe(&snapshot) {
            return false;
        }

        // whatever was being watched is no longer playing
        self.supervisor.cancel_all();

        if !snapshot.playing {
            log::debug!("Not playing: {}", snapshot);
            return false;
        }

        let Some(params) = self.normalizer.params(&snapshot) else {
            log::debug!("Ignoring due to missing metadata: {}", snapshot);
            return false;
        };

        match self.scrobbler.now_playing(&params).await {
            Ok(response) if response.ignored => log::warn!(
                "Server ignored now playing for {}: {}",
                snapshot,
                response.message.as_deref().unwrap_or("no reason given")
            ),
            Ok(response) => {
                log::info!("Now Playing: {}", snapshot);
                log::debug!("Response: {:?}", response);
            }
            Err(e) => log::warn!("Failed to update now playing: {:#}", e),
        }

        let session = ScrobbleSession::new(
            snapshot,
            params,
            sampled_at,
            Arc::clone(&self.player),
            Arc::clone(&self.scrobbler),
            &self.settings,
        );
        self.supervisor.spawn(session);
        true
    }
}
