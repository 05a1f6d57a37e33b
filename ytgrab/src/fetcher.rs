use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio_stream::StreamExt;
use yt_dlp::{DownloadEvent, DownloadOptions, VideoInfo, YtDlp};

use crate::validation::ValidatedUrl;

/// A finished download sitting in the output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
    pub details: VideoDetails
}

/// What yt-dlp reported about the video before downloading it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoDetails {
    pub title: String,
    pub duration: f64,
    pub uploader: String,
    pub view_count: u64
}

impl From<VideoInfo> for VideoDetails {
    fn from(info: VideoInfo) -> Self {
        Self {
            title: info.title,
            duration: info.duration.unwrap_or_default(),
            uploader: info.uploader.unwrap_or_else(|| "Unknown".to_string()),
            view_count: info.view_count.unwrap_or_default()
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("File too large: {size_mb:.1}MB > {limit_mb:.1}MB")]
    TooLarge { size_mb: f64, limit_mb: f64 },

    /// yt-dlp refused or failed; the text is yt-dlp's own.
    #[error("{0}")]
    Extraction(String),

    #[error("{0}")]
    Internal(String)
}

impl FetchError {
    #[allow(clippy::cast_precision_loss)]
    pub fn too_large(size_bytes: u64, limit_bytes: u64) -> Self {
        const MIB: f64 = 1024.0 * 1024.0;
        Self::TooLarge {
            size_mb: size_bytes as f64 / MIB,
            limit_mb: limit_bytes as f64 / MIB
        }
    }
}

impl From<yt_dlp::Error> for FetchError {
    fn from(err: yt_dlp::Error) -> Self {
        match err {
            yt_dlp::Error::CommandFailed { .. } | yt_dlp::Error::DownloadFailed(_) => {
                Self::Extraction(err.tool_message())
            }
            other => Self::Internal(other.to_string())
        }
    }
}

/// Resolves a validated URL into a media file inside `output_dir`.
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    async fn fetch(&self, url: &ValidatedUrl, output_dir: &Path) -> Result<FetchedFile, FetchError>;

    /// Version string of the underlying tool, if it can be determined.
    async fn version(&self) -> Option<String> {
        None
    }
}

pub struct YtDlpFetcher {
    client: YtDlp,
    options: DownloadOptions,
    max_file_size: u64
}

impl YtDlpFetcher {
    pub fn new(client: YtDlp, format: &str, max_file_size: u64) -> Self {
        Self {
            client,
            options: DownloadOptions::new()
                .format(format)
                .restrict_filenames(true)
                .single_item(true),
            max_file_size
        }
    }
}

#[async_trait]
impl VideoFetcher for YtDlpFetcher {
    #[tracing::instrument(skip(self, url, output_dir), fields(url = %url.as_str()))]
    async fn fetch(&self, url: &ValidatedUrl, output_dir: &Path) -> Result<FetchedFile, FetchError> {
        let info = self.client.get_video_info(url.as_str(), &self.options).await?;
        tracing::info!("Resolved {} to \"{}\"", info.id, info.title);

        if let Some(size) = info.estimated_size().filter(|&size| size > self.max_file_size) {
            return Err(FetchError::too_large(size, self.max_file_size));
        }

        tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
            FetchError::Internal(format!("failed to create {}: {e}", output_dir.display()))
        })?;

        // Unique per request so concurrent downloads of the same video never share a path.
        let request_id = uuid7::uuid7().to_string();
        let template = output_dir.join(format!("{request_id}_%(title)s.%(ext)s"));

        let mut events = self
            .client
            .download_with_progress(url.as_str(), &template, &self.options);
        let mut saved: Option<PathBuf> = None;

        while let Some(event) = events.next().await {
            match event? {
                DownloadEvent::Extracting { url: target } => {
                    tracing::debug!("Extracting {}", target);
                }
                DownloadEvent::Progress(progress) => {
                    tracing::debug!(
                        percent = ?progress.percent,
                        speed = ?progress.format_speed(),
                        eta = ?progress.format_eta(),
                        "download progress"
                    );
                }
                DownloadEvent::Saved { path } => {
                    saved = Some(PathBuf::from(path));
                }
                DownloadEvent::Warning { message } => {
                    tracing::warn!("yt-dlp warning: {}", message);
                }
                DownloadEvent::Error { message } => {
                    return Err(FetchError::Extraction(message));
                }
                DownloadEvent::Finished { path } => {
                    if let Some(path) = path {
                        saved = Some(PathBuf::from(path));
                    }
                }
            }
        }

        let path = match saved {
            Some(path) => path,
            None => find_by_prefix(output_dir, &format!("{request_id}_"))
                .await
                .map_err(|e| FetchError::Internal(format!("failed to scan output directory: {e}")))?
                .ok_or_else(|| FetchError::Internal("Downloaded file not found".to_string()))?
        };

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            FetchError::Internal(format!("failed to stat {}: {e}", path.display()))
        })?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| FetchError::Internal(format!("no file name in {}", path.display())))?;

        Ok(FetchedFile {
            path,
            filename,
            size_bytes: metadata.len(),
            details: VideoDetails::from(info)
        })
    }

    async fn version(&self) -> Option<String> {
        self.client.check_binary().await.ok()
    }
}

/// Fallback for when yt-dlp exits cleanly without printing the final path.
async fn find_by_prefix(dir: &Path, prefix: &str) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(prefix) && !name.ends_with(".part") {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}
