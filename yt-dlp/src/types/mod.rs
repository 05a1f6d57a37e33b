mod options;
mod progress;
mod video_info;

pub use options::DownloadOptions;
pub use progress::{DownloadEvent, DownloadProgress};
pub use video_info::{RequestedFormat, VideoInfo};
