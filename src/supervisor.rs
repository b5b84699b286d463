// Session supervisor
// Owns the spawned play sessions so they can be listed, cancelled and awaited

use crate::play_session::{ScrobbleSession, SessionState};
use crate::player::Player;
use crate::scrobbler::Scrobbler;
use crate::track::Identity;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct LiveSession {
    identity: Identity,
    cancel: CancellationToken,
    handle: JoinHandle<SessionState>,
}

pub struct SessionSupervisor {
    root: CancellationToken,
    sessions: Vec<LiveSession>,
}

impl SessionSupervisor {
    /// Sessions are cancelled together with `root`
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            sessions: Vec::new(),
        }
    }

    pub fn spawn<P: Player, S: Scrobbler>(&mut self, session: ScrobbleSession<P, S>) {
        self.reap();

        let cancel = self.root.child_token();
        let identity = session.identity().clone();
        log::debug!("Watching {}", identity);
        let handle = tokio::spawn(session.run(cancel.clone()));

        self.sessions.push(LiveSession {
            identity,
            cancel,
            handle,
        });
    }

    /// Tracks of the sessions that are still running
    pub fn live(&mut self) -> Vec<Identity> {
        self.reap();
        self.sessions.iter().map(|s| s.identity.clone()).collect()
    }

    /// Ask every running session to stop; they end at their next wake-up
    pub fn cancel_all(&self) {
        for session in &self.sessions {
            session.cancel.cancel();
        }
    }

    /// Wait for every session to finish and return how each one ended
    pub async fn join_all(&mut self) -> Vec<SessionState> {
        let mut states = Vec::with_capacity(self.sessions.len());
        for session in self.sessions.drain(..) {
            match session.handle.await {
                Ok(state) => states.push(state),
                Err(e) => log::error!("Session for {} panicked: {}", session.identity, e),
            }
        }
        states
    }

    /// Cancel everything and wait for it to wind down
    pub async fn shutdown(mut self) {
        self.root.cancel();
        self.join_all().await;
    }

    fn reap(&mut self) {
        self.sessions.retain(|s| !s.handle.is_finished());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::play_session::{AbandonReason, SessionSettings};
    use crate::scrobbler::ScrobbleParams;
    use crate::testing::{FakePlayer, FakeScrobbler};
    use crate::track::snapshot;
    use std::sync::Arc;
    use std::time::Duration;

    fn session(
        title: &str,
        player: &Arc<FakePlayer>,
        scrobbler: &Arc<FakeScrobbler>,
    ) -> ScrobbleSession<FakePlayer, FakeScrobbler> {
        let mut snap = snapshot(title, "X", "Y");
        snap.length = Duration::from_secs(300);
        player.play(snap.clone());
        let params = ScrobbleParams {
            artist: "X".to_string(),
            track: title.to_string(),
            album: "Y".to_string(),
            album_artist: None,
            duration: Some(300),
            track_number: None,
            timestamp: None,
        };
        let settings = SessionSettings {
            interval: Duration::from_secs(1),
            history: None,
        };
        ScrobbleSession::new(
            snap,
            params,
            tokio::time::Instant::now(),
            Arc::clone(player),
            Arc::clone(scrobbler),
            &settings,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn lists_and_reaps_sessions() {
        let player = Arc::new(FakePlayer::new());
        let scrobbler = Arc::new(FakeScrobbler::default());
        let mut supervisor = SessionSupervisor::new(CancellationToken::new());

        supervisor.spawn(session("B", &player, &scrobbler));
        let live = supervisor.live();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].title, "B");

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(supervisor.live().is_empty());
        assert_eq!(scrobbler.scrobbles().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_stops_running_sessions() {
        let player = Arc::new(FakePlayer::new());
        let scrobbler = Arc::new(FakeScrobbler::default());
        let mut supervisor = SessionSupervisor::new(CancellationToken::new());

        supervisor.spawn(session("B", &player, &scrobbler));
        tokio::time::sleep(Duration::from_secs(10)).await;
        supervisor.cancel_all();

        assert_eq!(
            supervisor.join_all().await,
            vec![SessionState::Abandoned(AbandonReason::Cancelled)]
        );
        assert!(scrobbler.scrobbles().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_through_root() {
        let player = Arc::new(FakePlayer::new());
        let scrobbler = Arc::new(FakeScrobbler::default());
        let root = CancellationToken::new();
        let mut supervisor = SessionSupervisor::new(root.clone());

        supervisor.spawn(session("B", &player, &scrobbler));
        supervisor.shutdown().await;

        assert!(root.is_cancelled());
        assert!(scrobbler.scrobbles().is_empty());
    }
}
