// Track snapshot module
// Point-in-time reads of the player's current track

use std::fmt;
use std::time::Duration;

/// The subset of track metadata that decides whether two samples are the same track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub title: String,
    pub artist: String,
    pub album_artist: Option<String>,
    pub album: String,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} [{}]", self.artist, self.title, self.album)
    }
}

/// One sample of the player's state
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Name of the player the sample was read from, informational only
    pub player: String,
    pub identity: Identity,
    pub track_number: Option<u32>,
    /// Zero when the player does not report a length
    pub length: Duration,
    pub position: Duration,
    pub playing: bool,
}

impl Snapshot {
    /// Identity-only comparison; track number, length, position and playback
    /// state never make two samples different tracks
    pub fn same_track(&self, other: &Snapshot) -> bool {
        self.identity == other.identity
    }

    pub fn title(&self) -> &str {
        &self.identity.title
    }

    pub fn artist(&self) -> &str {
        &self.identity.artist
    }

    pub fn album(&self) -> &str {
        &self.identity.album
    }

    pub fn album_artist(&self) -> Option<&str> {
        self.identity.album_artist.as_deref()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Player: {}, Track: {}, Artist: {}, Album: {}",
            self.player,
            self.title(),
            self.artist(),
            self.album()
        )
    }
}

#[cfg(test)]
pub(crate) fn snapshot(title: &str, artist: &str, album: &str) -> Snapshot {
    Snapshot {
        player: "test".to_string(),
        identity: Identity {
            title: title.to_string(),
            artist: artist.to_string(),
            album_artist: None,
            album: album.to_string(),
        },
        track_number: None,
        length: Duration::ZERO,
        position: Duration::ZERO,
        playing: true,
    }
}
