use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use songbird::input::{ChildContainer, HttpRequest, Input};
use std::{
    process::Stdio,
    time::Duration,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{SourceKind, StreamRequest, TrackMetadata, TrackProvider};
use crate::error::StreamError;

const YTDLP: &str = "yt-dlp";
const YTDLP_TIMEOUT: Duration = Duration::from_secs(30);

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
    is_live: Option<bool>,
}

impl YtDlpInfo {
    fn into_metadata(self) -> TrackMetadata {
        let url = self
            .webpage_url
            .or(self.url)
            .or_else(|| self.id.map(|id| format!("https://www.youtube.com/watch?v={id}")));

        TrackMetadata {
            url,
            title: self.title,
            // Los directos no tienen duración
            duration_secs: match self.is_live {
                Some(true) => None,
                _ => self.duration.map(|d| d.round() as u64),
            },
        }
    }
}

/// Proveedor basado en yt-dlp: metadata, búsqueda y streams de audio
pub struct YtDlpProvider {
    http: reqwest::Client,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

impl YtDlpProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            rate_limiter: Semaphore::new(3),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        let _permit = self.rate_limiter.acquire().await?;

        let output = tokio::time::timeout(YTDLP_TIMEOUT, Command::new(YTDLP).args(args).output())
            .await
            .context("yt-dlp timed out")?
            .context("Error al ejecutar yt-dlp")?;

        Ok(output)
    }

    /// Resolves a direct media URL for non-YouTube sources.
    async fn direct_url(&self, url: &str) -> Result<String> {
        let output = self
            .run(&["--no-playlist", "-f", "bestaudio/best", "--get-url", "--no-warnings", url])
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        let stream_url = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        if stream_url.is_empty() {
            anyhow::bail!("No se pudo obtener URL de stream");
        }

        Ok(stream_url)
    }

    /// Verifica que yt-dlp esté instalado
    pub async fn check_available(&self) -> Result<String> {
        let output = self.run(&["--version"]).await?;
        if !output.status.success() {
            anyhow::bail!("yt-dlp --version failed");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Whether yt-dlp's stderr says the media does not exist (as opposed to a tool failure).
fn is_missing_media(stderr: &str) -> bool {
    ["Video unavailable", "HTTP Error 404", "does not exist", "Private video"]
        .iter()
        .any(|marker| stderr.contains(marker))
}

fn metadata_from_json(json: &str) -> Result<TrackMetadata> {
    let info: YtDlpInfo = serde_json::from_str(json).context("Error al parsear respuesta de yt-dlp")?;
    Ok(info.into_metadata())
}

fn first_search_hit(stdout: &str) -> Option<TrackMetadata> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .find_map(|line| metadata_from_json(line).ok())
}

/// Argumentos para volcar solo el audio a stdout con buffers acotados
fn stream_args(request: &StreamRequest) -> Vec<String> {
    let format = if request.audio_only { "bestaudio" } else { "bestaudio/best" };
    vec![
        "--no-playlist".to_string(),
        "--quiet".to_string(),
        "--no-warnings".to_string(),
        "-f".to_string(),
        format.to_string(),
        "--buffer-size".to_string(),
        request.high_water_mark.to_string(),
        "--http-chunk-size".to_string(),
        request.chunk_size.to_string(),
        "-o".to_string(),
        "-".to_string(),
        request.url.clone(),
    ]
}

#[async_trait]
impl TrackProvider for YtDlpProvider {
    type Stream = Input;

    async fn lookup_by_link(&self, url: &str) -> Result<Option<TrackMetadata>> {
        debug!("📊 Obteniendo info de: {}", url);

        let output = self.run(&["--no-playlist", "--dump-json", "--no-warnings", url]).await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            if is_missing_media(&error) {
                return Ok(None);
            }
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        metadata_from_json(stdout.trim()).map(Some)
    }

    async fn search_first(&self, term: &str) -> Result<Option<TrackMetadata>> {
        info!("🔍 Buscando en YouTube: {}", term);

        let search_query = format!("ytsearch1:{}", term);
        let output = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(first_search_hit(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn open_audio_stream(&self, request: &StreamRequest) -> Result<Input, StreamError> {
        match request.kind {
            SourceKind::YouTube => {
                let child = std::process::Command::new(YTDLP)
                    .args(stream_args(request))
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|e| StreamError::unavailable(&request.url, e))?;

                debug!("🎵 yt-dlp (pid {}) transmitiendo {}", child.id(), request.url);
                Ok(ChildContainer::from(child).into())
            }
            SourceKind::SoundCloud | SourceKind::Other => {
                let stream_url = self.direct_url(&request.url).await.map_err(|e| {
                    warn!("❌ Sin URL de stream para {}: {:?}", request.url, e);
                    StreamError::unavailable(&request.url, e)
                })?;

                debug!("🎵 Stream HTTP para {} ({:?} de buffer en directo)", request.url, request.live_buffer);
                Ok(HttpRequest::new(self.http.clone(), stream_url).into())
            }
        }
    }
}
