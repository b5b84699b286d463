// Submission parameters
// Builds the Last.fm parameter set from a player snapshot

use crate::config::Config;
use crate::text_cleanup::{strip_features, TextCleaner};
use crate::track::Snapshot;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Parameters shared by "now playing" and "scrobble" calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleParams {
    pub artist: String,
    pub track: String,
    pub album: String,
    pub album_artist: Option<String>,
    /// Track length in whole seconds
    pub duration: Option<u64>,
    pub track_number: Option<u32>,
    /// Epoch seconds at which playback started, scrobbles only
    pub timestamp: Option<i64>,
}

impl ScrobbleParams {
    pub fn with_timestamp(mut self, started_at: DateTime<Utc>) -> Self {
        self.timestamp = Some(started_at.timestamp());
        self
    }

    /// Key/value pairs named as the Last.fm API expects them
    pub fn to_pairs(&self) -> BTreeMap<&'static str, String> {
        let mut pairs = BTreeMap::new();
        pairs.insert("artist", self.artist.clone());
        pairs.insert("track", self.track.clone());
        pairs.insert("album", self.album.clone());
        if let Some(album_artist) = &self.album_artist {
            pairs.insert("albumArtist", album_artist.clone());
        }
        if let Some(duration) = self.duration {
            pairs.insert("duration", duration.to_string());
        }
        if let Some(track_number) = self.track_number {
            pairs.insert("trackNumber", track_number.to_string());
        }
        if let Some(timestamp) = self.timestamp {
            pairs.insert("timestamp", timestamp.to_string());
        }
        pairs
    }
}

/// Turns snapshots into submission parameters
pub struct Normalizer {
    strip_features: bool,
    cleaner: TextCleaner,
}

impl Normalizer {
    pub fn new(strip_features: bool, cleaner: TextCleaner) -> Self {
        Self {
            strip_features,
            cleaner,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.strip_features, TextCleaner::new(&config.cleanup))
    }

    /// Build parameters for a snapshot, or `None` when title, artist or
    /// album is missing and the track must not be submitted
    pub fn params(&self, snapshot: &Snapshot) -> Option<ScrobbleParams> {
        let mut artist = self.cleaner.clean(snapshot.artist());
        let mut track = self.cleaner.clean(snapshot.title());
        let album = self.cleaner.clean(snapshot.album());

        if self.strip_features {
            artist = strip_features(&artist).to_string();
            track = strip_features(&track).to_string();
        }

        if artist.is_empty() || track.is_empty() || album.is_empty() {
            return None;
        }

        let album_artist = self
            .cleaner
            .clean_option(snapshot.album_artist())
            .filter(|a| !a.is_empty());
        let duration = Some(snapshot.length.as_secs()).filter(|&secs| secs != 0);
        let track_number = snapshot.track_number.filter(|&n| n != 0);

        Some(ScrobbleParams {
            artist,
            track,
            album,
            album_artist,
            duration,
            track_number,
            timestamp: None,
        })
    }
}
