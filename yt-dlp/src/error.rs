use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("yt-dlp binary not found: {0}")]
    BinaryNotFound(PathBuf),

    #[error("yt-dlp binary not executable: {0}")]
    BinaryNotExecutable(PathBuf),

    #[error("failed to execute yt-dlp: {0}")]
    ExecutionFailed(#[from] std::io::Error),

    #[error("yt-dlp exited with code {code}: {message}")]
    CommandFailed { code: i32, message: String },

    #[error("failed to parse JSON output: {0}")]
    JsonParseFailed(#[from] serde_json::Error),

    #[error("yt-dlp produced no metadata")]
    EmptyOutput,

    #[error("download failed: {0}")]
    DownloadFailed(String)
}

impl Error {
    /// The text yt-dlp itself reported, without this crate's framing.
    ///
    /// Falls back to the full display string for errors that did not
    /// originate from yt-dlp output.
    pub fn tool_message(&self) -> String {
        match self {
            Error::CommandFailed { message, .. } | Error::DownloadFailed(message) => {
                message.clone()
            }
            other => other.to_string()
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
