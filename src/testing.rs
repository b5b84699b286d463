// Test doubles for the player and the scrobbling service

use crate::player::Player;
use crate::scrobbler::{ScrobbleParams, Scrobbler, SubmissionResponse};
use crate::track::Snapshot;
use anyhow::Result;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct FakeState {
    snapshot: Snapshot,
    /// Position at `anchor`
    base: Duration,
    /// Set while playing; the position advances with the (paused) tokio clock
    anchor: Option<Instant>,
    exists: bool,
    connected: bool,
    online: bool,
    reconnects: u32,
}

impl FakeState {
    fn position(&self) -> Duration {
        match self.anchor {
            Some(anchor) => self.base + anchor.elapsed(),
            None => self.base,
        }
    }
}

/// A player whose position follows the tokio clock
pub struct FakePlayer {
    state: Mutex<FakeState>,
}

impl FakePlayer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                snapshot: Snapshot::default(),
                base: Duration::ZERO,
                anchor: None,
                exists: true,
                connected: true,
                online: true,
                reconnects: 0,
            }),
        }
    }

    /// Switch to `snapshot`, starting from its position
    pub fn play(&self, snapshot: Snapshot) {
        let mut state = self.state.lock().unwrap();
        state.base = snapshot.position;
        state.anchor = snapshot.playing.then(Instant::now);
        state.snapshot = snapshot;
    }

    pub fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        state.base = state.position();
        state.anchor = None;
        state.snapshot.playing = false;
    }

    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        state.anchor = Some(Instant::now());
        state.snapshot.playing = true;
    }

    pub fn seek(&self, position: Duration) {
        let mut state = self.state.lock().unwrap();
        state.base = position;
        if state.anchor.is_some() {
            state.anchor = Some(Instant::now());
        }
    }

    pub fn vanish(&self) {
        self.state.lock().unwrap().exists = false;
    }

    /// Fail refreshes until the next reconnect
    pub fn disconnect(&self) {
        self.state.lock().unwrap().connected = false;
    }

    /// Fail refreshes and every reconnect attempt
    pub fn go_offline(&self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.online = false;
    }

    pub fn reconnects(&self) -> u32 {
        self.state.lock().unwrap().reconnects
    }
}

impl Player for FakePlayer {
    async fn refresh(&self) -> Result<Snapshot> {
        let state = self.state.lock().unwrap();
        if !state.connected {
            anyhow::bail!("not connected");
        }
        let mut snapshot = state.snapshot.clone();
        snapshot.position = state.position();
        Ok(snapshot)
    }

    async fn position(&self) -> Result<Duration> {
        let state = self.state.lock().unwrap();
        if !state.connected {
            anyhow::bail!("not connected");
        }
        Ok(state.position())
    }

    async fn exists(&self) -> bool {
        self.state.lock().unwrap().exists
    }

    async fn reconnect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.reconnects += 1;
        if !state.online {
            anyhow::bail!("connection refused");
        }
        state.connected = true;
        Ok(())
    }
}

/// Records every submission
#[derive(Default)]
pub struct FakeScrobbler {
    now_playing: Mutex<Vec<ScrobbleParams>>,
    scrobbles: Mutex<Vec<ScrobbleParams>>,
    failing: bool,
    /// How long a now playing call takes to answer
    latency: Duration,
}

impl FakeScrobbler {
    /// A service whose calls all fail
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// A service that takes `latency` to answer now playing calls
    pub fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn now_playing_calls(&self) -> Vec<ScrobbleParams> {
        self.now_playing.lock().unwrap().clone()
    }

    pub fn scrobbles(&self) -> Vec<ScrobbleParams> {
        self.scrobbles.lock().unwrap().clone()
    }
}

impl Scrobbler for FakeScrobbler {
    async fn now_playing(&self, params: &ScrobbleParams) -> Result<SubmissionResponse> {
        self.now_playing.lock().unwrap().push(params.clone());
        tokio::time::sleep(self.latency).await;
        if self.failing {
            anyhow::bail!("service unavailable");
        }
        Ok(SubmissionResponse::default())
    }

    async fn scrobble(&self, params: &ScrobbleParams) -> Result<SubmissionResponse> {
        self.scrobbles.lock().unwrap().push(params.clone());
        if self.failing {
            anyhow::bail!("service unavailable");
        }
        Ok(SubmissionResponse::default())
    }
}
