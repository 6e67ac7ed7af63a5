//! # Sources
//!
//! Track resolution and stream acquisition.
//!
//! A [`Song`] is the immutable descriptor the queue holds. It is produced by
//! [`Song::resolve`] from a link or a search term, and turned into a playable
//! [`AudioResource`] only when the queue is about to play it
//! ([`Song::open_stream`]). Everything provider-specific lives behind the
//! [`TrackProvider`] trait; the production implementation is
//! [`youtube::YtDlpProvider`].

pub mod youtube;

use async_trait::async_trait;
use regex::Regex;
use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::error::{ResolutionError, StreamError};

pub use youtube::YtDlpProvider;

/// Título usado cuando el proveedor no lo informa
pub const UNKNOWN_TITLE: &str = "Unknown title";

static VIDEO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.)?(m\.|music\.)?(youtube\.com|youtu\.?be)/.+$")
        .expect("video pattern is valid")
});

static SOUNDCLOUD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.|m\.)?soundcloud\.com/.+$").expect("soundcloud pattern is valid")
});

/// Metadata devuelta por un proveedor. Todos los campos pueden faltar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub url: Option<String>,
    pub title: Option<String>,
    pub duration_secs: Option<u64>,
}

/// Proveedor de origen de una canción, decide cómo se abre el stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    YouTube,
    SoundCloud,
    Other,
}

impl SourceKind {
    pub fn detect(url: &str) -> Self {
        if url.contains("youtube") || url.contains("youtu.be") {
            SourceKind::YouTube
        } else if SOUNDCLOUD_PATTERN.is_match(url) {
            SourceKind::SoundCloud
        } else {
            SourceKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "youtube",
            SourceKind::SoundCloud => "soundcloud",
            SourceKind::Other => "other",
        }
    }
}

/// Parámetros de un stream solo-audio con buffer acotado
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub url: String,
    pub kind: SourceKind,
    pub audio_only: bool,
    /// Bytes máximos retenidos antes de aplicar backpressure
    pub high_water_mark: usize,
    pub chunk_size: usize,
    pub live_buffer: Duration,
}

impl StreamRequest {
    pub fn for_song(song: &Song) -> Self {
        Self {
            url: song.url.clone(),
            kind: song.kind(),
            audio_only: true,
            high_water_mark: 16 * 1024,
            chunk_size: 64 * 1024,
            live_buffer: Duration::from_millis(2000),
        }
    }
}

/// Recurso reproducible: el stream abierto más la canción que lo originó.
///
/// El volumen se controla aparte, en el reproductor, así que el mismo
/// recurso acepta cambios de ganancia mientras suena.
pub struct AudioResource<S> {
    pub song: Arc<Song>,
    pub stream: S,
}

impl<S> std::fmt::Debug for AudioResource<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioResource").field("song", &self.song).finish_non_exhaustive()
    }
}

/// Capacidades que la resolución de canciones necesita de un proveedor
#[async_trait]
pub trait TrackProvider: Send + Sync {
    type Stream: Send + 'static;

    /// Metadata de un enlace directo. `Ok(None)` si el enlace no existe.
    async fn lookup_by_link(&self, url: &str) -> anyhow::Result<Option<TrackMetadata>>;

    /// Primer resultado de una búsqueda. `Ok(None)` si no hay resultados.
    async fn search_first(&self, term: &str) -> anyhow::Result<Option<TrackMetadata>>;

    async fn open_audio_stream(&self, request: &StreamRequest) -> Result<Self::Stream, StreamError>;
}

/// Canción resuelta. Inmutable una vez construida.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    url: String,
    title: String,
    duration: u64,
}

impl Song {
    pub fn new(url: impl Into<String>, title: impl Into<String>, duration: u64) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            duration,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Duración en segundos, `0` para directos o duración desconocida
    pub fn duration_secs(&self) -> u64 {
        self.duration
    }

    pub fn duration(&self) -> Option<Duration> {
        (self.duration > 0).then(|| Duration::from_secs(self.duration))
    }

    pub fn kind(&self) -> SourceKind {
        SourceKind::detect(&self.url)
    }

    /// Whether `input` is a link this bot can fetch metadata for directly.
    pub fn is_supported_link(input: &str) -> bool {
        VIDEO_PATTERN.is_match(input) || SOUNDCLOUD_PATTERN.is_match(input)
    }

    fn looks_like_url(input: &str) -> bool {
        url::Url::parse(input).is_ok_and(|parsed| matches!(parsed.scheme(), "http" | "https"))
    }

    /// Resolves a song from a link, or from a search term when no supported
    /// link is given.
    ///
    /// A supported link is looked up directly. Anything URL-shaped that is
    /// not supported is rejected. Otherwise the first search hit is taken
    /// and its details fetched.
    pub async fn resolve<P>(provider: &P, url: &str, search: &str) -> Result<Self, ResolutionError>
    where
        P: TrackProvider + ?Sized,
    {
        let url = url.trim();
        let search = search.trim();

        let link = if Self::is_supported_link(url) {
            url.to_string()
        } else if Self::looks_like_url(url) {
            warn!("🚫 Enlace no soportado: {}", url);
            return Err(ResolutionError::InvalidInput(url.to_string()));
        } else {
            let term = if search.is_empty() { url } else { search };
            if term.is_empty() {
                return Err(ResolutionError::InvalidInput(String::new()));
            }

            info!("🔍 Buscando: {}", term);
            let hit = match provider.search_first(term).await {
                Ok(Some(hit)) => hit,
                Ok(None) => return Err(ResolutionError::NoResults(term.to_string())),
                Err(e) => {
                    warn!("❌ Búsqueda fallida para \"{}\": {:?}", term, e);
                    return Err(ResolutionError::MetadataUnavailable(term.to_string()));
                }
            };

            hit.url
                .filter(|u| !u.is_empty())
                .ok_or_else(|| ResolutionError::MetadataUnavailable(term.to_string()))?
        };

        let details = match provider.lookup_by_link(&link).await {
            Ok(Some(details)) => details,
            Ok(None) => return Err(ResolutionError::MetadataUnavailable(link)),
            Err(e) => {
                warn!("❌ Sin metadata para {}: {:?}", link, e);
                return Err(ResolutionError::MetadataUnavailable(link));
            }
        };

        let song = Self {
            url: details.url.filter(|u| !u.is_empty()).unwrap_or(link),
            title: details
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            duration: details.duration_secs.unwrap_or(0),
        };

        debug!("🎵 Canción resuelta: {} ({}s)", song.title, song.duration);
        Ok(song)
    }

    /// Opens an audio-only stream for this song. Touches no queue state.
    pub async fn open_stream<P>(self: &Arc<Self>, provider: &P) -> Result<AudioResource<P::Stream>, StreamError>
    where
        P: TrackProvider + ?Sized,
    {
        let request = StreamRequest::for_song(self);
        debug!("🔗 Abriendo stream {} para: {}", request.kind.as_str(), self.title);

        let stream = provider.open_audio_stream(&request).await?;

        Ok(AudioResource {
            song: Arc::clone(self),
            stream,
        })
    }

    pub fn start_message(&self) -> String {
        crate::ui::messages::started_playing(&self.title, &self.url)
    }
}
