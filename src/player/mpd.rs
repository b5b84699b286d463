// MPD backend
// Talks to a Music Player Daemon over TCP or a Unix socket

use super::Player;
use crate::config::{MpdConfig, MpdProtocol};
use crate::track::{Identity, Snapshot};
use anyhow::{Context, Result};
use mpd_client::commands;
use mpd_client::responses::{PlayState, Song};
use mpd_client::tag::Tag;
use mpd_client::Client;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::sync::RwLock;

pub struct MpdPlayer {
    settings: MpdConfig,
    client: RwLock<Client>,
}

impl MpdPlayer {
    pub async fn connect(settings: MpdConfig) -> Result<Self> {
        let client = dial(&settings).await?;
        log::info!("Connected to MPD at {}", settings.address);

        Ok(Self {
            settings,
            client: RwLock::new(client),
        })
    }

    async fn client(&self) -> Client {
        self.client.read().await.clone()
    }
}

async fn dial(settings: &MpdConfig) -> Result<Client> {
    let password = settings.password.as_deref().filter(|p| !p.is_empty());

    match settings.protocol {
        MpdProtocol::Tcp => {
            let connection = TcpStream::connect(&settings.address)
                .await
                .with_context(|| format!("Failed to connect to MPD at {}", settings.address))?;
            handshake(connection, password).await
        }
        #[cfg(unix)]
        MpdProtocol::Unix => {
            let connection = UnixStream::connect(&settings.address)
                .await
                .with_context(|| format!("Failed to connect to MPD at {}", settings.address))?;
            handshake(connection, password).await
        }
        #[cfg(not(unix))]
        MpdProtocol::Unix => anyhow::bail!("Unix sockets are not supported on this platform"),
    }
}

async fn handshake<C>(connection: C, password: Option<&str>) -> Result<Client>
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (client, _events) = match password {
        Some(password) => Client::connect_with_password(connection, password)
            .await
            .context("MPD rejected the password")?,
        None => Client::connect(connection)
            .await
            .context("MPD handshake failed")?,
    };
    Ok(client)
}

impl Player for MpdPlayer {
    async fn refresh(&self) -> Result<Snapshot> {
        let client = self.client().await;
        let status = client
            .command(commands::Status)
            .await
            .context("Failed to read MPD status")?;
        let current = client
            .command(commands::CurrentSong)
            .await
            .context("Failed to read current MPD song")?;

        let mut snapshot = match current {
            Some(entry) => snapshot_from_song(&entry.song),
            None => Snapshot::default(),
        };
        snapshot.player = "mpd".to_string();
        snapshot.playing = matches!(status.state, PlayState::Playing);
        snapshot.length = status.duration.unwrap_or_default();
        snapshot.position = status.elapsed.unwrap_or_default();

        Ok(snapshot)
    }

    async fn position(&self) -> Result<Duration> {
        let status = self
            .client()
            .await
            .command(commands::Status)
            .await
            .context("Failed to read MPD status")?;
        Ok(status.elapsed.unwrap_or_default())
    }

    async fn exists(&self) -> bool {
        self.client().await.command(commands::Ping).await.is_ok()
    }

    async fn reconnect(&self) -> Result<()> {
        let client = dial(&self.settings).await?;
        *self.client.write().await = client;
        Ok(())
    }
}

/// All values of a tag, joined with ", "
fn tag(song: &Song, tag: Tag) -> String {
    song.tags
        .get(&tag)
        .map(|values| values.join(", "))
        .unwrap_or_default()
}

fn snapshot_from_song(song: &Song) -> Snapshot {
    let album_artist = tag(song, Tag::AlbumArtist);

    Snapshot {
        identity: Identity {
            title: tag(song, Tag::Title),
            artist: tag(song, Tag::Artist),
            album_artist: Some(album_artist).filter(|a| !a.is_empty()),
            album: tag(song, Tag::Album),
        },
        track_number: track_number(&tag(song, Tag::Track)),
        ..Snapshot::default()
    }
}

/// "3" or "3/12"
fn track_number(value: &str) -> Option<u32> {
    value
        .split('/')
        .next()
        .and_then(|n| n.trim().parse::<u32>().ok())
        .filter(|&n| n != 0)
}
