use std::sync::LazyLock;

use regex::Regex;

/// Which of the accepted link forms a URL matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlShape {
    Watch,
    Short,
    Embed,
    Legacy,
    Playlist
}

impl UrlShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Watch => "watch",
            Self::Short => "short",
            Self::Embed => "embed",
            Self::Legacy => "legacy",
            Self::Playlist => "playlist"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("URL is required")]
    Missing,

    #[error("URL must be a string")]
    NotAString,

    #[error("Invalid YouTube URL format")]
    InvalidFormat
}

/// A trimmed URL that matched one of the accepted shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl {
    url: String,
    shape: UrlShape,
    id: String
}

impl ValidatedUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn shape(&self) -> UrlShape {
        self.shape
    }

    /// Video id, or playlist id for `UrlShape::Playlist`.
    pub fn id(&self) -> &str {
        &self.id
    }
}

// Scheme and host match case-insensitively; the path and id do not.
static PATTERNS: LazyLock<Vec<(UrlShape, Regex)>> = LazyLock::new(|| {
    [
        (UrlShape::Watch, r"^(?i:https?://(?:www\.)?youtube\.com)/watch\?v=([A-Za-z0-9_-]{11})"),
        (UrlShape::Short, r"^(?i:https?://(?:www\.)?youtu\.be)/([A-Za-z0-9_-]{11})"),
        (UrlShape::Embed, r"^(?i:https?://(?:www\.)?youtube\.com)/embed/([A-Za-z0-9_-]{11})"),
        (UrlShape::Legacy, r"^(?i:https?://(?:www\.)?youtube\.com)/v/([A-Za-z0-9_-]{11})"),
        (
            UrlShape::Playlist,
            r"^(?i:https?://(?:www\.)?youtube\.com)/playlist\?list=([A-Za-z0-9_-]+)"
        )
    ]
    .into_iter()
    .map(|(shape, pattern)| (shape, Regex::new(pattern).expect("URL patterns are valid")))
    .collect()
});

/// Purely syntactic check; never touches the network.
pub fn validate_url(raw: &str) -> Result<ValidatedUrl, ValidationError> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(ValidationError::Missing);
    }

    PATTERNS
        .iter()
        .find_map(|(shape, pattern)| {
            let id = pattern.captures(url)?.get(1)?.as_str().to_string();
            Some(ValidatedUrl {
                url: url.to_string(),
                shape: *shape,
                id
            })
        })
        .ok_or(ValidationError::InvalidFormat)
}
