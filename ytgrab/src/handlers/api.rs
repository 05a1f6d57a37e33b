use std::any::Any;
use std::io::ErrorKind;

use axum::{
    Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    response::{IntoResponse, Response}
};
use serde_json::Value;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::models::{DownloadRequest, DownloadResponse};
use crate::state::AppState;

#[tracing::instrument(skip(state, payload))]
pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>
) -> Result<Json<DownloadResponse>, AppError> {
    let Json(body) = payload.map_err(|rejection| {
        tracing::debug!("rejected body: {}", rejection);
        AppError::bad_request("Request must be JSON")
    })?;

    let request = DownloadRequest::try_from(body)?;
    let url = request.validate()?;

    tracing::info!(
        "Processing download request for: {} ({} link, id {})",
        url.as_str(),
        url.shape().as_str(),
        url.id()
    );

    let file = state.fetcher.fetch(&url, &state.config.download_dir).await?;

    tracing::info!("Successfully downloaded: {} ({} bytes)", file.path.display(), file.size_bytes);

    Ok(Json(DownloadResponse::from(&file)))
}

#[tracing::instrument(skip(state))]
pub async fn serve_file(
    State(state): State<AppState>,
    Path(filename): Path<String>
) -> Result<Response, AppError> {
    if !is_plain_filename(&filename) {
        return Err(AppError::forbidden("Access denied"));
    }

    let root = match tokio::fs::canonicalize(&state.config.download_dir).await {
        Ok(root) => root,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AppError::not_found("File not found"));
        }
        Err(e) => return Err(e.into())
    };

    let path = match tokio::fs::canonicalize(root.join(&filename)).await {
        Ok(path) => path,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AppError::not_found("File not found"));
        }
        Err(e) => return Err(e.into())
    };

    // Symlinks may still point elsewhere.
    if !path.starts_with(&root) {
        return Err(AppError::forbidden("Access denied"));
    }

    let file = tokio::fs::File::open(&path).await?;
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(AppError::not_found("File not found"));
    }

    tracing::info!("Serving {} ({} bytes)", filename, metadata.len());

    Response::builder()
        .header(CONTENT_TYPE, content_type_for_filename(&filename))
        .header(CONTENT_LENGTH, metadata.len())
        .header(CONTENT_DISPOSITION, attachment_header(&filename))
        .header(CACHE_CONTROL, "no-store")
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(AppError::internal)
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "yt_dlp": state.fetcher.version().await
    }))
}

pub async fn not_found() -> AppError {
    AppError::not_found("Endpoint not found")
}

pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    AppError::internal(format!("handler panicked: {detail}")).into_response()
}

/// A single path component naming something inside the download directory.
fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Names outside the conservative ASCII set are replaced so the header stays well formed.
fn attachment_header(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

fn content_type_for_filename(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "opus" => "audio/ogg",
        _ => "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path as FsPath, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::{
        body::to_bytes,
        http::{Request, StatusCode}
    };
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::build_router;
    use crate::config::Config;
    use crate::fetcher::{FetchError, FetchedFile, VideoDetails, VideoFetcher};
    use crate::validation::ValidatedUrl;

    struct MockFetcher {
        result: Result<FetchedFile, FetchError>,
        calls: AtomicUsize
    }

    impl MockFetcher {
        fn new(result: Result<FetchedFile, FetchError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0)
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VideoFetcher for MockFetcher {
        async fn fetch(
            &self,
            _url: &ValidatedUrl,
            _output_dir: &FsPath
        ) -> Result<FetchedFile, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }

        async fn version(&self) -> Option<String> {
            Some("2025.01.15".to_string())
        }
    }

    fn test_config(download_dir: &FsPath) -> Config {
        Config {
            bind_addr: "127.0.0.1:0".to_string(),
            download_dir: download_dir.to_path_buf(),
            max_file_size: 500 * 1024 * 1024,
            download_format: "best".to_string(),
            static_dir: PathBuf::from("static"),
            ytdlp_path: None,
            ffmpeg_path: None,
            deno_path: None,
            cookies_file: None,
            extractor_args: Vec::new()
        }
    }

    fn fetched(filename: &str) -> FetchedFile {
        FetchedFile {
            path: PathBuf::from("/tmp").join(filename),
            filename: filename.to_string(),
            size_bytes: 4096,
            details: VideoDetails {
                title: "Never Gonna Give You Up".to_string(),
                duration: 213.0,
                uploader: "Rick Astley".to_string(),
                view_count: 42
            }
        }
    }

    fn router(fetcher: Arc<MockFetcher>, download_dir: &FsPath) -> axum::Router {
        build_router(AppState {
            fetcher,
            config: Arc::new(test_config(download_dir))
        })
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/download")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_download_success() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new(Ok(fetched("0192_Never_Gonna_Give_You_Up.mp4")));
        let response = router(fetcher.clone(), dir.path())
            .oneshot(post_json(r#"{"url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["filename"], "0192_Never_Gonna_Give_You_Up.mp4");
        assert_eq!(body["download_url"], "/files/0192_Never_Gonna_Give_You_Up.mp4");
        assert_eq!(body["size"], 4096);
        assert_eq!(body["message"], "Video downloaded successfully");
        assert_eq!(body["video_info"], json!({
            "title": "Never Gonna Give You Up",
            "duration": 213.0,
            "uploader": "Rick Astley",
            "view_count": 42
        }));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_download_failure_forwards_tool_message() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new(Err(FetchError::Extraction(
            "[youtube] dQw4w9WgXcQ: Video unavailable".to_string()
        )));
        let response = router(fetcher.clone(), dir.path())
            .oneshot(post_json(r#"{"url": "https://youtu.be/dQw4w9WgXcQ"}"#))
            .await
            .unwrap();

        assert!(!response.status().is_success());
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body, json!({
            "success": false,
            "error": "Download failed: [youtube] dQw4w9WgXcQ: Video unavailable"
        }));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_too_large_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new(Err(FetchError::too_large(600 * 1024 * 1024, 500 * 1024 * 1024)));
        let response = router(fetcher, dir.path())
            .oneshot(post_json(r#"{"url": "https://youtu.be/dQw4w9WgXcQ"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "File too large: 600.0MB > 500.0MB");
    }

    #[tokio::test]
    async fn test_internal_failure_is_generic() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new(Err(FetchError::Internal(
            "failed to stat /tmp/secret".to_string()
        )));
        let response = router(fetcher, dir.path())
            .oneshot(post_json(r#"{"url": "https://youtu.be/dQw4w9WgXcQ"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body, json!({"success": false, "error": "Internal server error"}));
    }

    #[tokio::test]
    async fn test_rejected_requests_never_reach_fetcher() {
        let cases = [
            (r#"{"url": ""}"#, "URL is required"),
            (r#"{"url": "   "}"#, "URL is required"),
            (r"{}", "URL is required"),
            (r#"{"url": 17}"#, "URL must be a string"),
            (r#"{"url": "https://example.com/video"}"#, "Invalid YouTube URL format"),
            ("not json at all", "Request must be JSON")
        ];

        for (payload, message) in cases {
            let dir = tempfile::tempdir().unwrap();
            let fetcher = MockFetcher::new(Ok(fetched("x.mp4")));
            let response = router(fetcher.clone(), dir.path())
                .oneshot(post_json(payload))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{payload}");
            let body = json_body(response).await;
            assert_eq!(body["success"], false, "{payload}");
            assert_eq!(body["error"], message, "{payload}");
            assert_eq!(fetcher.calls(), 0, "{payload}");
        }
    }

    #[tokio::test]
    async fn test_missing_content_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new(Ok(fetched("x.mp4")));
        let request = Request::builder()
            .method("POST")
            .uri("/download")
            .body(Body::from(r#"{"url": "https://youtu.be/dQw4w9WgXcQ"}"#))
            .unwrap();
        let response = router(fetcher.clone(), dir.path()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Request must be JSON");
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_serve_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0192_clip.mp4"), b"fake video bytes").unwrap();
        let fetcher = MockFetcher::new(Ok(fetched("x.mp4")));

        let response = router(fetcher, dir.path())
            .oneshot(get("/files/0192_clip.mp4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
        assert_eq!(response.headers()[CONTENT_LENGTH], "16");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"0192_clip.mp4\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"fake video bytes");
    }

    #[tokio::test]
    async fn test_serve_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new(Ok(fetched("x.mp4")));
        let response = router(fetcher, dir.path())
            .oneshot(get("/files/nothing.mp4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "File not found");
    }

    #[tokio::test]
    async fn test_serve_file_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        std::fs::create_dir(&downloads).unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"secret").unwrap();
        let fetcher = MockFetcher::new(Ok(fetched("x.mp4")));

        let response = router(fetcher, &downloads)
            .oneshot(get("/files/..%2Fsecret.txt"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"], "Access denied");
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new(Ok(fetched("x.mp4")));
        let response = router(fetcher, dir.path()).oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["yt_dlp"], "2025.01.15");
        assert!(body["timestamp"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new(Ok(fetched("x.mp4")));
        let response = router(fetcher, dir.path()).oneshot(get("/nope")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await, json!({
            "success": false,
            "error": "Endpoint not found"
        }));
    }

    #[tokio::test]
    async fn test_index_page() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new(Ok(fetched("x.mp4")));
        let response = router(fetcher, dir.path()).oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("download-form"));
        assert!(html.contains("500 MB"));
    }

    #[test]
    fn test_is_plain_filename() {
        assert!(is_plain_filename("0192_Title.mp4"));
        assert!(!is_plain_filename(""));
        assert!(!is_plain_filename(".."));
        assert!(!is_plain_filename("../etc/passwd"));
        assert!(!is_plain_filename("a\\b.mp4"));
    }

    #[test]
    fn test_attachment_header_escapes_name() {
        assert_eq!(
            attachment_header("0192_clip.mp4"),
            "attachment; filename=\"0192_clip.mp4\""
        );
        assert_eq!(
            attachment_header("a\"b;c\r\n.mp4"),
            "attachment; filename=\"a_b_c__.mp4\""
        );
        assert_eq!(attachment_header("clip é.mp4"), "attachment; filename=\"clip _.mp4\"");
    }

    #[tokio::test]
    async fn test_serve_file_with_quote_in_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("say \"hi\".mp4"), b"x").unwrap();
        let fetcher = MockFetcher::new(Ok(fetched("x.mp4")));

        let response = router(fetcher, dir.path())
            .oneshot(get("/files/say%20%22hi%22.mp4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"say _hi_.mp4\""
        );
    }

    #[test]
    fn test_content_type_for_filename() {
        assert_eq!(content_type_for_filename("a.MP4"), "video/mp4");
        assert_eq!(content_type_for_filename("a.webm"), "video/webm");
        assert_eq!(content_type_for_filename("noext"), "application/octet-stream");
    }

    #[test]
    fn test_panic_response_is_generic_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
