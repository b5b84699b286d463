// Play session module
// Watches one playing track and scrobbles it once Last.fm's rules are met

use crate::history::{ScrobbleHistory, ScrobbleRecord};
use crate::player::Player;
use crate::scrobbler::{ScrobbleParams, Scrobbler};
use crate::track::{Identity, Snapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A track counts as listened once more than this much of it has played
const SCROBBLE_FRACTION: f64 = 0.5;
/// ...or once it has played this many seconds, whichever comes first
const SCROBBLE_TIME_THRESHOLD: u64 = 240;
/// Largest gap in seconds between expected and reported position before the
/// session stops trusting the player
const DRIFT_TOLERANCE: u64 = 5;

/// Whether a track of `length` played up to `position` may be scrobbled.
/// An unknown (zero) length only qualifies through the time threshold.
pub fn is_valid_scrobble(position: Duration, length: Duration) -> bool {
    let position = position.as_secs();
    let length = length.as_secs();
    position > SCROBBLE_TIME_THRESHOLD
        || (length > 0 && position as f64 / length as f64 > SCROBBLE_FRACTION)
}

/// Whether the reported position is close enough to where uninterrupted
/// playback would be
pub fn within_drift(expected: Duration, actual: Duration) -> bool {
    expected.as_secs().abs_diff(actual.as_secs()) <= DRIFT_TOLERANCE
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    PlayerGone,
    SampleFailed,
    /// Seek, or sampling fell behind
    Drift { expected: u64, actual: u64 },
    TrackChanged,
    Duplicate,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Scrobbled,
    Abandoned(AbandonReason),
}

/// Outcome of checking one sample against the session's track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Wait,
    Abandon(AbandonReason),
    Ready,
}

/// Timing and shared state handed to every session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub interval: Duration,
    /// Present when duplicate suppression is enabled
    pub history: Option<ScrobbleHistory>,
}

pub struct ScrobbleSession<P, S> {
    track: Snapshot,
    params: ScrobbleParams,
    started_at: DateTime<Utc>,
    /// Where playback should be if nobody seeked
    expected: Duration,
    interval: Duration,
    history: Option<ScrobbleHistory>,
    player: Arc<P>,
    scrobbler: Arc<S>,
}

impl<P: Player, S: Scrobbler> ScrobbleSession<P, S> {
    /// Start watching `track`, read from the player at `sampled_at`. Playback
    /// is back-dated by the position the track had reached plus the time
    /// since that sample.
    pub fn new(
        track: Snapshot,
        params: ScrobbleParams,
        sampled_at: Instant,
        player: Arc<P>,
        scrobbler: Arc<S>,
        settings: &SessionSettings,
    ) -> Self {
        let elapsed = (track.position + sampled_at.elapsed()).as_secs();
        let started_at = Utc::now() - chrono::Duration::seconds(elapsed as i64);

        Self {
            params: params.with_timestamp(started_at),
            started_at,
            expected: Duration::from_secs(elapsed),
            interval: settings.interval,
            history: settings.history.clone(),
            track,
            player,
            scrobbler,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.track.identity
    }

    /// Judge one sample taken after `self.expected` was advanced
    pub fn evaluate(&self, position: Duration, current: &Snapshot) -> Verdict {
        if !within_drift(self.expected, position) {
            return Verdict::Abandon(AbandonReason::Drift {
                expected: self.expected.as_secs(),
                actual: position.as_secs(),
            });
        }
        if !self.track.same_track(current) {
            return Verdict::Abandon(AbandonReason::TrackChanged);
        }
        if current.playing && is_valid_scrobble(current.position, current.length) {
            Verdict::Ready
        } else {
            Verdict::Wait
        }
    }

    /// One poll cycle without the sleep
    pub async fn tick(&mut self) -> SessionState {
        self.expected += self.interval;

        if !self.player.exists().await {
            return SessionState::Abandoned(AbandonReason::PlayerGone);
        }

        let sampled = async {
            let position = self.player.position().await?;
            let current = self.player.refresh().await?;
            anyhow::Ok((position, current))
        };
        let (position, current) = match sampled.await {
            Ok(sample) => sample,
            Err(e) => {
                log::debug!("Sampling {} failed: {:#}", self.track.identity, e);
                return SessionState::Abandoned(AbandonReason::SampleFailed);
            }
        };

        match self.evaluate(position, &current) {
            Verdict::Wait => SessionState::Running,
            Verdict::Abandon(reason) => SessionState::Abandoned(reason),
            Verdict::Ready => self.submit().await,
        }
    }

    async fn submit(&self) -> SessionState {
        if let Some(history) = &self.history {
            let record = ScrobbleRecord {
                identity: self.track.identity.clone(),
                started_at: self.started_at,
                length: self.track.length,
            };
            if !history.claim(record) {
                log::debug!("Skipping duplicate scrobble of {}", self.track.identity);
                return SessionState::Abandoned(AbandonReason::Duplicate);
            }
        }

        match self.scrobbler.scrobble(&self.params).await {
            Ok(response) if response.ignored => {
                log::warn!(
                    "Server ignored scrobble of {}: {}",
                    self.track.identity,
                    response.message.as_deref().unwrap_or("no reason given")
                );
            }
            Ok(response) => {
                log::info!("Scrobbled: {}", self.track);
                log::debug!("Response: {:?}", response);
            }
            Err(e) => log::warn!("Failed to scrobble {}: {:#}", self.track.identity, e),
        }

        SessionState::Scrobbled
    }

    /// Poll until the session reaches a terminal state or is cancelled
    pub async fn run(mut self, cancel: CancellationToken) -> SessionState {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionState::Abandoned(AbandonReason::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }

            let state = self.tick().await;
            if state != SessionState::Running {
                log::debug!("Session for {} ended: {:?}", self.track.identity, state);
                return state;
            }
        }
    }
}
