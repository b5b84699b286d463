// Player backends
// Polls the active player and reports track changes to the media monitor

pub mod mpd;
pub mod mpris;

use crate::track::Snapshot;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Read access to a live player session
pub trait Player: Send + Sync + 'static {
    /// Sample metadata, playback state, length and position
    fn refresh(&self) -> impl Future<Output = Result<Snapshot>> + Send;

    /// Sample the playback position only
    fn position(&self) -> impl Future<Output = Result<Duration>> + Send;

    /// Whether the player session is still there
    fn exists(&self) -> impl Future<Output = bool> + Send;

    /// Drop and re-establish the connection to the player
    fn reconnect(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Notification sent from the watcher to the media monitor
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Title or artist differ from the previous poll
    Changed {
        snapshot: Snapshot,
        /// When the player was read
        sampled_at: Instant,
    },
}

/// How hard the watcher tries to get a lost connection back
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(15),
        }
    }
}

/// Constant delay, given up after a fixed number of retries
struct Bounded {
    remaining: u32,
    delay: Duration,
}

impl backoff::backoff::Backoff for Bounded {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.delay)
    }
}

impl ReconnectPolicy {
    fn backoff(&self) -> Bounded {
        Bounded {
            // the first attempt happens without waiting
            remaining: self.attempts.saturating_sub(1),
            delay: self.delay,
        }
    }
}

/// Long-lived polling task that turns player samples into change events
pub struct Watcher<P> {
    player: Arc<P>,
    interval: Duration,
    reconnect: ReconnectPolicy,
}

impl<P: Player> Watcher<P> {
    pub fn new(player: Arc<P>, interval: Duration) -> Self {
        Self {
            player,
            interval,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Poll until cancelled or until the receiver goes away. Fails only when
    /// the player cannot be reached again after all reconnect attempts.
    pub async fn run(self, events: mpsc::Sender<PlayerEvent>, cancel: CancellationToken) -> Result<()> {
        let mut previous = Snapshot::default();

        loop {
            match self.sample().await {
                Ok(Some(snapshot)) => {
                    let sampled_at = Instant::now();
                    let changed = snapshot.title() != previous.title()
                        || snapshot.artist() != previous.artist();
                    if changed {
                        log::debug!("Player changed: {}", snapshot);
                        let event = PlayerEvent::Changed {
                            snapshot: snapshot.clone(),
                            sampled_at,
                        };
                        if events.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    previous = snapshot;
                }
                Ok(None) => {}
                Err(e) => return Err(e),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// One refresh, reconnecting first if it fails. `Ok(None)` means the
    /// connection came back but the follow-up refresh still failed.
    async fn sample(&self) -> Result<Option<Snapshot>> {
        match self.player.refresh().await {
            Ok(snapshot) => return Ok(Some(snapshot)),
            Err(e) => log::warn!("Failed to refresh player: {:#}", e),
        }

        self.reconnect().await?;

        match self.player.refresh().await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                log::warn!("Refresh after reconnect failed: {:#}", e);
                Ok(None)
            }
        }
    }

    async fn reconnect(&self) -> Result<()> {
        let player = &self.player;
        backoff::future::retry_notify(
            self.reconnect.backoff(),
            || async move { player.reconnect().await.map_err(backoff::Error::transient) },
            |e: anyhow::Error, delay: Duration| {
                log::warn!("Reconnect failed: {:#}. Retrying in {:?}", e, delay);
            },
        )
        .await
        .context("Failed to reconnect to player")?;

        log::info!("Reconnected to player");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlayer;
    use crate::track::snapshot;

    fn watcher(player: &Arc<FakePlayer>) -> Watcher<FakePlayer> {
        Watcher::new(Arc::clone(player), Duration::from_secs(1))
    }

    async fn next_title(rx: &mut mpsc::Receiver<PlayerEvent>) -> String {
        match rx.recv().await {
            Some(PlayerEvent::Changed { snapshot, .. }) => snapshot.title().to_string(),
            None => panic!("watcher stopped"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reports_title_changes_only() {
        let player = Arc::new(FakePlayer::new());
        player.play(snapshot("A", "X", "Y"));

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(watcher(&player).run(tx, cancel.clone()));

        assert_eq!(next_title(&mut rx).await, "A");

        player.pause();
        tokio::time::sleep(Duration::from_secs(3)).await;
        player.resume();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());

        player.play(snapshot("B", "X", "Y"));
        assert_eq!(next_title(&mut rx).await, "B");

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_from_dropped_connection() {
        let player = Arc::new(FakePlayer::new());
        player.play(snapshot("A", "X", "Y"));

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(watcher(&player).run(tx, cancel.clone()));
        assert_eq!(next_title(&mut rx).await, "A");

        player.disconnect();
        player.play(snapshot("B", "X", "Y"));
        assert_eq!(next_title(&mut rx).await, "B");
        assert_eq!(player.reconnects(), 1);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bounded_reconnects() {
        let player = Arc::new(FakePlayer::new());
        player.play(snapshot("A", "X", "Y"));
        player.go_offline();

        let (tx, _rx) = mpsc::channel(8);
        let started = Instant::now();
        let result = watcher(&player).run(tx, CancellationToken::new()).await;

        assert!(result.is_err());
        assert_eq!(player.reconnects(), 10);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(9 * 15));
        assert!(waited < Duration::from_secs(10 * 15));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_receiver_is_gone() {
        let player = Arc::new(FakePlayer::new());
        player.play(snapshot("A", "X", "Y"));

        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        watcher(&player)
            .run(tx, CancellationToken::new())
            .await
            .unwrap();
    }
}
