//! Async Rust wrapper for the yt-dlp CLI.
//!
//! Covers the two calls a download front-end needs: probing a URL for
//! metadata, and running a single download while streaming what yt-dlp
//! reports (progress, final file path, warnings, errors).
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//! use yt_dlp::{DownloadEvent, DownloadOptions, YtDlp};
//!
//! #[tokio::main]
//! async fn main() -> yt_dlp::Result<()> {
//!     let client = YtDlp::new();
//!     let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
//!     let options = DownloadOptions::new().format("best[height<=720]").single_item(true);
//!
//!     let info = client.get_video_info(url, &options).await?;
//!     println!("Title: {}", info.title);
//!
//!     let mut events = client.download_with_progress(url, "%(title)s.%(ext)s", &options);
//!     while let Some(event) = events.next().await {
//!         if let DownloadEvent::Finished { path } = event? {
//!             println!("Saved to {path:?}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod command;
pub mod error;
pub mod types;

pub use client::{DownloadStream, YtDlp};
pub use error::{Error, Result};
pub use types::{DownloadEvent, DownloadOptions, DownloadProgress, RequestedFormat, VideoInfo};
