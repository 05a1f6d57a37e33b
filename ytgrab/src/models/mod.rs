mod request;

pub use request::{DownloadRequest, DownloadResponse};
