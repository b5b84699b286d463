// MPRIS backend
// Reads the current media player from the D-Bus session bus

use super::Player;
use crate::track::{Identity, Snapshot};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use zbus::fdo::DBusProxy;
use zbus::names::BusName;
use zbus::proxy::CacheProperties;
use zbus::Connection;
use zvariant::{OwnedValue, Value};

const BUS_PREFIX: &str = "org.mpris.MediaPlayer2.";

#[zbus::proxy(
    interface = "org.mpris.MediaPlayer2.Player",
    default_path = "/org/mpris/MediaPlayer2",
    gen_blocking = false
)]
trait MediaPlayer {
    #[zbus(property)]
    fn playback_status(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn metadata(&self) -> zbus::Result<HashMap<String, OwnedValue>>;

    #[zbus(property)]
    fn position(&self) -> zbus::Result<i64>;
}

/// Follows whichever MPRIS player is currently the most relevant one
pub struct MprisPlayer {
    connection: RwLock<Connection>,
    /// Bus name picked by the last refresh
    current: Mutex<Option<String>>,
}

impl MprisPlayer {
    pub async fn connect() -> Result<Self> {
        let connection = Connection::session()
            .await
            .context("Error connecting to D-Bus")?;

        Ok(Self {
            connection: RwLock::new(connection),
            current: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Connection {
        self.connection.read().await.clone()
    }

    /// Properties like `Position` change without signals, so nothing is cached
    async fn proxy(&self, name: &str) -> Result<MediaPlayerProxy<'static>> {
        MediaPlayerProxy::builder(&self.connection().await)
            .destination(name.to_string())?
            .cache_properties(CacheProperties::No)
            .build()
            .await
            .with_context(|| format!("Failed to open player {}", name))
    }

    /// `None` when the player cannot be asked, e.g. it is shutting down
    async fn status(&self, name: &str) -> Option<String> {
        let status = async { anyhow::Ok(self.proxy(name).await?.playback_status().await?) };
        match status.await {
            Ok(status) => Some(status),
            Err(e) => {
                log::debug!("Skipping {}: {:#}", name, e);
                None
            }
        }
    }

    /// Only a failure to talk to the bus itself is an error
    async fn select(&self) -> Result<Option<String>> {
        let dbus = DBusProxy::new(&self.connection().await).await?;
        let mut names: Vec<String> = dbus
            .list_names()
            .await
            .context("Failed to list D-Bus names")?
            .into_iter()
            .map(|name| name.to_string())
            .filter(|name| name.starts_with(BUS_PREFIX))
            .collect();
        names.sort();

        let mut candidates = Vec::with_capacity(names.len());
        for name in names {
            let status = self.status(&name).await;
            candidates.push((name, status));
        }
        Ok(pick_player(candidates))
    }

    async fn read(&self, name: &str) -> Result<Snapshot> {
        let proxy = self.proxy(name).await?;
        let metadata = proxy
            .metadata()
            .await
            .with_context(|| format!("Failed to read metadata from {}", name))?;
        let playing = proxy.playback_status().await? == "Playing";
        // some players don't implement Position
        let position = proxy.position().await.unwrap_or_default();

        Ok(snapshot_from_metadata(name, &metadata, position, playing))
    }

    async fn current(&self) -> Result<String> {
        self.current
            .lock()
            .await
            .clone()
            .context("No MPRIS player selected")
    }
}

impl Player for MprisPlayer {
    async fn refresh(&self) -> Result<Snapshot> {
        let selected = self.select().await?;
        *self.current.lock().await = selected.clone();

        let Some(name) = selected else {
            return Ok(Snapshot::default());
        };

        // a misbehaving player is not a lost bus connection
        Ok(self.read(&name).await.unwrap_or_else(|e| {
            log::debug!("Reading {} failed: {:#}", name, e);
            Snapshot::default()
        }))
    }

    async fn position(&self) -> Result<Duration> {
        let name = self.current().await?;
        let position = self.proxy(&name).await?.position().await?;
        Ok(micros(position))
    }

    async fn exists(&self) -> bool {
        let Ok(name) = self.current().await else {
            return false;
        };
        let Ok(bus_name) = BusName::try_from(name.as_str()) else {
            return false;
        };
        match DBusProxy::new(&self.connection().await).await {
            Ok(dbus) => dbus.name_has_owner(bus_name).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn reconnect(&self) -> Result<()> {
        let connection = Connection::session()
            .await
            .context("Error connecting to D-Bus")?;
        *self.connection.write().await = connection;
        Ok(())
    }
}

/// The first player reporting `Playing`, otherwise the first one that
/// answered at all
fn pick_player(candidates: Vec<(String, Option<String>)>) -> Option<String> {
    let mut fallback = None;
    for (name, status) in candidates {
        match status.as_deref() {
            Some("Playing") => return Some(name),
            Some(_) if fallback.is_none() => fallback = Some(name),
            _ => {}
        }
    }
    fallback
}

fn micros(value: i64) -> Duration {
    Duration::from_micros(value.max(0) as u64)
}

/// Strings or string lists (joined with ", ") as MPRIS players send them
fn text(metadata: &HashMap<String, OwnedValue>, key: &str) -> String {
    match metadata.get(key).map(|value| &**value) {
        Some(Value::Str(s)) => s.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

fn integer(metadata: &HashMap<String, OwnedValue>, key: &str) -> Option<i64> {
    match metadata.get(key).map(|value| &**value) {
        Some(Value::I32(n)) => Some(i64::from(*n)),
        Some(Value::U32(n)) => Some(i64::from(*n)),
        Some(Value::I64(n)) => Some(*n),
        Some(Value::U64(n)) => i64::try_from(*n).ok(),
        _ => None,
    }
}

fn snapshot_from_metadata(
    name: &str,
    metadata: &HashMap<String, OwnedValue>,
    position: i64,
    playing: bool,
) -> Snapshot {
    let album_artist = text(metadata, "xesam:albumArtist");

    Snapshot {
        player: name.trim_start_matches(BUS_PREFIX).to_string(),
        identity: Identity {
            title: text(metadata, "xesam:title"),
            artist: text(metadata, "xesam:artist"),
            album_artist: Some(album_artist).filter(|a| !a.is_empty()),
            album: text(metadata, "xesam:album"),
        },
        track_number: integer(metadata, "xesam:trackNumber")
            .and_then(|n| u32::try_from(n).ok())
            .filter(|&n| n != 0),
        length: integer(metadata, "mpris:length")
            .map(micros)
            .unwrap_or_default(),
        position: micros(position),
        playing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(v: Value<'_>) -> OwnedValue {
        OwnedValue::try_from(v).unwrap()
    }

    fn candidate(name: &str, status: Option<&str>) -> (String, Option<String>) {
        (name.to_string(), status.map(str::to_string))
    }

    #[test]
    fn playing_player_wins() {
        let picked = pick_player(vec![
            candidate("org.mpris.MediaPlayer2.a", Some("Paused")),
            candidate("org.mpris.MediaPlayer2.b", Some("Playing")),
        ]);
        assert_eq!(picked.as_deref(), Some("org.mpris.MediaPlayer2.b"));
    }

    #[test]
    fn unresponsive_players_are_never_picked() {
        let picked = pick_player(vec![
            candidate("org.mpris.MediaPlayer2.a", None),
            candidate("org.mpris.MediaPlayer2.b", Some("Stopped")),
            candidate("org.mpris.MediaPlayer2.c", Some("Paused")),
        ]);
        assert_eq!(picked.as_deref(), Some("org.mpris.MediaPlayer2.b"));

        assert_eq!(pick_player(vec![candidate("org.mpris.MediaPlayer2.a", None)]), None);
        assert_eq!(pick_player(Vec::new()), None);
    }

    #[test]
    fn reads_xesam_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert("xesam:title".to_string(), value(Value::from("Song")));
        metadata.insert(
            "xesam:artist".to_string(),
            value(Value::from(vec!["One", "Two"])),
        );
        metadata.insert("xesam:album".to_string(), value(Value::from("Album")));
        metadata.insert("xesam:trackNumber".to_string(), value(Value::from(3i32)));
        metadata.insert("mpris:length".to_string(), value(Value::from(215_000_000i64)));

        let snap = snapshot_from_metadata(
            "org.mpris.MediaPlayer2.spotify",
            &metadata,
            12_500_000,
            true,
        );

        assert_eq!(snap.player, "spotify");
        assert_eq!(snap.title(), "Song");
        assert_eq!(snap.artist(), "One, Two");
        assert_eq!(snap.album(), "Album");
        assert_eq!(snap.album_artist(), None);
        assert_eq!(snap.track_number, Some(3));
        assert_eq!(snap.length, Duration::from_secs(215));
        assert_eq!(snap.position, Duration::from_micros(12_500_000));
        assert!(snap.playing);
    }

    #[test]
    fn missing_metadata_reads_as_empty() {
        let snap = snapshot_from_metadata("org.mpris.MediaPlayer2.vlc", &HashMap::new(), -1, false);

        assert_eq!(snap.title(), "");
        assert_eq!(snap.track_number, None);
        assert_eq!(snap.length, Duration::ZERO);
        assert_eq!(snap.position, Duration::ZERO);
    }
}
