use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use futures_core::Stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::sync::mpsc;

use crate::command::{CommandBuilder, PROGRESS_MARKER, SAVED_MARKER};
use crate::error::{Error, Result};
use crate::types::{DownloadEvent, DownloadOptions, DownloadProgress, VideoInfo};

const STDERR_TAIL_LINES: usize = 50;

pub type DownloadStream = Pin<Box<dyn Stream<Item = Result<DownloadEvent>> + Send + 'static>>;

#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    cookies_file: Option<PathBuf>,
    extra_args: Vec<String>,
    ffmpeg_location: Option<PathBuf>,
    env_vars: HashMap<String, String>
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlp {
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            binary: path.into(),
            cookies_file: None,
            extra_args: Vec::new(),
            ffmpeg_location: None,
            env_vars: HashMap::new()
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn set_cookies_file(&mut self, path: Option<PathBuf>) {
        self.cookies_file = path;
    }

    pub fn set_extra_args(&mut self, args: Vec<String>) {
        self.extra_args = args;
    }

    pub fn set_ffmpeg_location(&mut self, path: Option<PathBuf>) {
        self.ffmpeg_location = path;
    }

    /// `PATH_PREPEND` is joined in front of the inherited `PATH`; every
    /// other key is set as-is on the child process.
    pub fn set_env(&mut self, key: String, value: String) {
        self.env_vars.insert(key, value);
    }

    pub async fn check_binary(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(Error::BinaryNotExecutable(self.binary.clone()))
        }
    }

    /// Resolves metadata for the item `options` would download, without
    /// downloading it.
    pub async fn get_video_info(&self, url: &str, options: &DownloadOptions) -> Result<VideoInfo> {
        let builder = self
            .command()
            .with_options(options)
            .json_output()
            .skip_download()
            .no_warnings()
            .url(url);

        tracing::debug!(
            binary = %builder.binary().display(),
            args = ?builder.get_args(),
            "probing with yt-dlp"
        );

        let output = builder
            .build_with_env(&self.env_vars)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr: Vec<String> = String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(str::to_string)
                .collect();
            let code = output.status.code().unwrap_or(-1);
            return Err(Error::CommandFailed {
                code,
                message: failure_message(&stderr, code)
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first = stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .ok_or(Error::EmptyOutput)?;

        Ok(serde_json::from_str(first)?)
    }

    /// Runs one download and streams what yt-dlp reports while it works.
    ///
    /// The stream always ends with either `Finished` or `Error`; the latter
    /// carries yt-dlp's own error text when it printed one.
    pub fn download_with_progress(
        &self,
        url: &str,
        output: impl AsRef<Path>,
        options: &DownloadOptions
    ) -> DownloadStream {
        let client = self.clone();
        let url = url.to_string();
        let output = output.as_ref().to_path_buf();
        let options = options.clone();

        Box::pin(async_stream::try_stream! {
            yield DownloadEvent::Extracting { url: url.clone() };

            let builder = client
                .command()
                .with_options(&options)
                .output(&output)
                .report_progress()
                .url(&url);

            tracing::debug!(
                binary = %builder.binary().display(),
                args = ?builder.get_args(),
                "spawning yt-dlp"
            );

            let mut cmd = builder.build_with_env(&client.env_vars);
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
            cmd.kill_on_drop(true);

            let mut child = cmd.spawn().map_err(|e| client.spawn_error(e))?;

            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| Error::DownloadFailed("stderr not captured".to_string()))?;
            // With --print set, yt-dlp is quiet and writes progress lines to stderr.
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let stderr_task = tokio::spawn(collect_stderr(stderr, progress_tx));

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| Error::DownloadFailed("stdout not captured".to_string()))?;
            let mut reader = BufReader::new(stdout).lines();

            let mut saved_path: Option<String> = None;
            let mut stdout_open = true;

            loop {
                let next = tokio::select! {
                    line = reader.next_line(), if stdout_open => OutputLine::Stdout(line),
                    Some(progress) = progress_rx.recv() => OutputLine::Progress(progress),
                    else => break
                };

                match next {
                    OutputLine::Stdout(line) => {
                        let Some(line) = line? else {
                            stdout_open = false;
                            continue;
                        };
                        tracing::trace!(line = %line, "yt-dlp stdout");
                        if let Some(event) = parse_output_line(&line) {
                            if let DownloadEvent::Saved { ref path } = event {
                                saved_path = Some(path.clone());
                            }
                            yield event;
                        }
                    }
                    OutputLine::Progress(progress) => {
                        yield DownloadEvent::Progress(progress);
                    }
                }
            }

            let status = child.wait().await?;
            let stderr_lines = match stderr_task.await {
                Ok(lines) => lines,
                Err(e) => {
                    tracing::warn!("yt-dlp stderr reader failed: {}", e);
                    Vec::new()
                }
            };

            for line in &stderr_lines {
                if let Some(message) = line.strip_prefix("WARNING:") {
                    yield DownloadEvent::Warning { message: message.trim().to_string() };
                }
            }

            if status.success() {
                yield DownloadEvent::Finished { path: saved_path };
            } else {
                let code = status.code().unwrap_or(-1);
                yield DownloadEvent::Error { message: failure_message(&stderr_lines, code) };
            }
        })
    }

    fn command(&self) -> CommandBuilder {
        CommandBuilder::new(&self.binary)
            .cookies_file_opt(self.cookies_file.as_ref())
            .ffmpeg_location_opt(self.ffmpeg_location.as_ref())
            .args(self.extra_args.iter().map(String::as_str))
    }

    fn spawn_error(&self, err: std::io::Error) -> Error {
        if err.kind() == ErrorKind::NotFound {
            Error::BinaryNotFound(self.binary.clone())
        } else {
            Error::ExecutionFailed(err)
        }
    }
}

enum OutputLine {
    Stdout(std::io::Result<Option<String>>),
    Progress(DownloadProgress)
}

/// Forwards progress lines and keeps the last few other lines for error reporting.
async fn collect_stderr(
    stderr: ChildStderr,
    progress: mpsc::UnboundedSender<DownloadProgress>
) -> Vec<String> {
    let mut reader = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = reader.next_line().await {
        tracing::trace!(line = %line, "yt-dlp stderr");
        if let Some(content) = line.trim().strip_prefix(PROGRESS_MARKER) {
            if let Some(update) = parse_template_progress(content) {
                let _ = progress.send(update);
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into()
}

/// Picks the message yt-dlp meant for the user out of its stderr.
fn failure_message(stderr: &[String], code: i32) -> String {
    let last_error = stderr
        .iter()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ERROR:"))
        .map(str::trim)
        .filter(|message| !message.is_empty());

    if let Some(message) = last_error {
        return message.to_string();
    }

    stderr
        .iter()
        .rev()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .map_or_else(|| format!("yt-dlp exited with code {code}"), str::to_string)
}

fn parse_output_line(line: &str) -> Option<DownloadEvent> {
    let line = line.trim();

    if let Some(path) = line.strip_prefix(SAVED_MARKER) {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }
        return Some(DownloadEvent::Saved {
            path: path.to_string()
        });
    }

    if let Some(content) = line.strip_prefix(PROGRESS_MARKER) {
        return parse_template_progress(content).map(DownloadEvent::Progress);
    }

    if let Some(message) = line.strip_prefix("WARNING:") {
        return Some(DownloadEvent::Warning {
            message: message.trim().to_string()
        });
    }

    if let Some(message) = line.strip_prefix("ERROR:") {
        return Some(DownloadEvent::Error {
            message: message.trim().to_string()
        });
    }

    None
}

fn parse_template_progress(content: &str) -> Option<DownloadProgress> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    let (first, rest) = parts.split_first()?;

    let percent = first.trim_end_matches('%').parse::<f64>().ok();
    let total_bytes = rest.first().and_then(|s| parse_size(s));
    let speed = rest
        .iter()
        .find(|s| s.ends_with("/s"))
        .and_then(|s| parse_speed(s));
    let eta = rest
        .last()
        .filter(|s| s.contains(':'))
        .and_then(|s| parse_eta(s));

    Some(DownloadProgress {
        total_bytes,
        speed,
        eta,
        percent
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim().trim_start_matches('~');
    if s == "N/A" || s.is_empty() {
        return None;
    }

    let multipliers = [
        ("GiB", 1024u64 * 1024 * 1024),
        ("MiB", 1024 * 1024),
        ("KiB", 1024),
        ("GB", 1000 * 1000 * 1000),
        ("MB", 1000 * 1000),
        ("KB", 1000),
        ("B", 1)
    ];

    for (suffix, mult) in multipliers {
        if let Some(num_str) = s.strip_suffix(suffix)
            && let Ok(num) = num_str.trim().parse::<f64>()
        {
            return Some((num * mult as f64) as u64);
        }
    }

    None
}

#[allow(clippy::cast_precision_loss)]
fn parse_speed(s: &str) -> Option<f64> {
    let s = s.trim().trim_end_matches("/s");
    parse_size(s).map(|b| b as f64)
}

fn parse_eta(s: &str) -> Option<f64> {
    let s = s.trim();
    if s == "N/A" || s == "Unknown" || s.is_empty() {
        return None;
    }

    let parts: Vec<&str> = s.split(':').collect();
    match parts.len() {
        1 => parts[0].parse::<f64>().ok(),
        2 => {
            let mins: f64 = parts[0].parse().ok()?;
            let secs: f64 = parts[1].parse().ok()?;
            Some(mins * 60.0 + secs)
        }
        3 => {
            let hours: f64 = parts[0].parse().ok()?;
            let mins: f64 = parts[1].parse().ok()?;
            let secs: f64 = parts[2].parse().ok()?;
            Some(hours * 3600.0 + mins * 60.0 + secs)
        }
        _ => None
    }
}
