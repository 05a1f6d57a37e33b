#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadProgress {
    pub total_bytes: Option<u64>,
    pub speed: Option<f64>,
    pub eta: Option<f64>,
    pub percent: Option<f64>
}

impl DownloadProgress {
    pub fn format_speed(&self) -> Option<String> {
        self.speed.map(|s| {
            if s >= 1_000_000.0 {
                format!("{:.2} MB/s", s / 1_000_000.0)
            } else if s >= 1_000.0 {
                format!("{:.2} KB/s", s / 1_000.0)
            } else {
                format!("{s:.0} B/s")
            }
        })
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn format_eta(&self) -> Option<String> {
        self.eta.map(|e| {
            let secs = e as u64;
            let mins = secs / 60;
            let hours = mins / 60;
            if hours > 0 {
                format!("{}:{:02}:{:02}", hours, mins % 60, secs % 60)
            } else {
                format!("{}:{:02}", mins, secs % 60)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Extracting { url: String },
    Progress(DownloadProgress),
    /// yt-dlp moved the finished file to its final location.
    Saved { path: String },
    Finished { path: Option<String> },
    Warning { message: String },
    Error { message: String }
}
