use std::path::PathBuf;

use anyhow::{Context, Result};
use yt_dlp::YtDlp;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MAX_FILE_SIZE_MB: u64 = 500;
const DEFAULT_DOWNLOAD_FORMAT: &str = "best[height<=720]";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub download_dir: PathBuf,
    /// Upper bound on yt-dlp's size estimate, in bytes.
    pub max_file_size: u64,
    pub download_format: String,
    pub static_dir: PathBuf,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub deno_path: Option<PathBuf>,
    pub cookies_file: Option<PathBuf>,
    pub extractor_args: Vec<String>
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Empty values count as unset.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got {raw:?}"))?,
            None => DEFAULT_PORT
        };
        let host = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());

        let max_file_size_mb = match get("MAX_FILE_SIZE_MB") {
            Some(raw) => raw.parse::<u64>().with_context(|| {
                format!("MAX_FILE_SIZE_MB must be a whole number of megabytes, got {raw:?}")
            })?,
            None => DEFAULT_MAX_FILE_SIZE_MB
        };

        Ok(Self {
            bind_addr: format!("{host}:{port}"),
            download_dir: get("DOWNLOAD_DIR")
                .map_or_else(|| std::env::temp_dir().join("yt_downloads"), PathBuf::from),
            max_file_size: max_file_size_mb.saturating_mul(1024 * 1024),
            download_format: get("DOWNLOAD_FORMAT")
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_FORMAT.to_string()),
            static_dir: get("STATIC_DIR").map_or_else(|| PathBuf::from("static"), PathBuf::from),
            ytdlp_path: get("YTDLP_PATH").map(PathBuf::from),
            ffmpeg_path: get("FFMPEG_PATH").map(PathBuf::from),
            deno_path: get("DENO_PATH").map(PathBuf::from),
            cookies_file: get("COOKIES_FILE").map(PathBuf::from),
            extractor_args: get("EXTRACTOR_ARGS")
                .map(|raw| parse_extractor_args(&raw))
                .unwrap_or_default()
        })
    }

    pub fn yt_dlp_client(&self) -> YtDlp {
        let mut yt_dlp = match self.ytdlp_path {
            Some(ref path) => {
                tracing::info!("Using custom yt-dlp path: {}", path.display());
                YtDlp::with_binary(path)
            }
            None => YtDlp::new()
        };

        if !self.extractor_args.is_empty() {
            yt_dlp.set_extra_args(self.extractor_args.clone());
        }

        if let Some(ref path) = self.cookies_file {
            if path.exists() {
                yt_dlp.set_cookies_file(Some(path.clone()));
                tracing::info!("Using cookies file: {}", path.display());
            } else {
                tracing::warn!("Cookies file {} does not exist, ignoring", path.display());
            }
        }

        if let Some(ref path) = self.ffmpeg_path {
            yt_dlp.set_ffmpeg_location(Some(path.clone()));
            tracing::info!("Using custom ffmpeg path: {}", path.display());
        }

        if let Some(parent) = self.deno_path.as_deref().and_then(std::path::Path::parent) {
            yt_dlp.set_env("PATH_PREPEND".to_string(), parent.to_string_lossy().to_string());
            tracing::info!("Using deno from: {}", parent.display());
        }

        yt_dlp
    }
}

/// Turns newline- or `;`-separated extractor arguments into a single
/// `--extractor-args` pair.
pub fn parse_extractor_args(input: &str) -> Vec<String> {
    let joined: Vec<&str> = input
        .split(['\n', ';'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if joined.is_empty() {
        return Vec::new();
    }
    vec!["--extractor-args".to_string(), joined.join(";")]
}
