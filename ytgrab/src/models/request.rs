use serde::Serialize;
use serde_json::Value;

use crate::fetcher::{FetchedFile, VideoDetails};
use crate::validation::{ValidatedUrl, ValidationError, validate_url};

/// Body of `POST /download`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String
}

impl DownloadRequest {
    pub fn validate(&self) -> Result<ValidatedUrl, ValidationError> {
        validate_url(&self.url)
    }
}

/// A missing or `null` url reads as empty; any other non-string is rejected.
impl TryFrom<Value> for DownloadRequest {
    type Error = ValidationError;

    fn try_from(body: Value) -> Result<Self, Self::Error> {
        match body.get("url") {
            None | Some(Value::Null) => Ok(Self { url: String::new() }),
            Some(Value::String(url)) => Ok(Self { url: url.clone() }),
            Some(_) => Err(ValidationError::NotAString)
        }
    }
}

const SUCCESS_MESSAGE: &str = "Video downloaded successfully";

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResponse {
    pub success: bool,
    pub message: &'static str,
    pub download_url: String,
    pub filename: String,
    pub title: String,
    pub size: u64,
    pub video_info: VideoDetails
}

impl From<&FetchedFile> for DownloadResponse {
    fn from(file: &FetchedFile) -> Self {
        // yt-dlp runs with --restrict-filenames, so the name is URL-safe as is.
        Self {
            success: true,
            message: SUCCESS_MESSAGE,
            download_url: format!("/files/{}", file.filename),
            filename: file.filename.clone(),
            title: file.details.title.clone(),
            size: file.size_bytes,
            video_info: file.details.clone()
        }
    }
}
