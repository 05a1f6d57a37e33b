use serde::{Deserialize, Serialize};

/// Subset of the `--dump-json` document needed before a download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
    /// Present when the selected format is a merge of several streams.
    #[serde(default)]
    pub requested_formats: Vec<RequestedFormat>
}

impl VideoInfo {
    /// Best available size estimate for the selected format, in bytes.
    pub fn estimated_size(&self) -> Option<u64> {
        if let Some(size) = self.filesize.or(self.filesize_approx) {
            return Some(size);
        }
        if self.requested_formats.is_empty() {
            return None;
        }
        self.requested_formats
            .iter()
            .map(RequestedFormat::estimated_size)
            .sum::<Option<u64>>()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedFormat {
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>
}

impl RequestedFormat {
    pub fn estimated_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}
