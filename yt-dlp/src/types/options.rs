#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Format selector passed to `-f`; yt-dlp's own default when `None`.
    pub format: Option<String>,
    pub restrict_filenames: bool,
    /// Fetch exactly one item, even when the URL names a playlist.
    pub single_item: bool
}

impl DownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn restrict_filenames(mut self, restrict: bool) -> Self {
        self.restrict_filenames = restrict;
        self
    }

    pub fn single_item(mut self, single: bool) -> Self {
        self.single_item = single;
        self
    }
}
