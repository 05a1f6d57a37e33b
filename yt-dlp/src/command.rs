use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::types::DownloadOptions;

/// Prefix of the line printed once the final file is in place.
pub(crate) const SAVED_MARKER: &str = "[saved]";

/// Prefix of every progress line emitted through `--progress-template`.
pub(crate) const PROGRESS_MARKER: &str = "[progress]";

pub struct CommandBuilder {
    binary: PathBuf,
    args: Vec<String>
}

impl CommandBuilder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn url(self, url: impl Into<String>) -> Self {
        self.arg(url)
    }

    pub fn json_output(self) -> Self {
        self.arg("--dump-json")
    }

    pub fn skip_download(self) -> Self {
        self.arg("--skip-download")
    }

    pub fn output(self, template: impl AsRef<Path>) -> Self {
        self.arg("-o").arg(template.as_ref().to_string_lossy().to_string())
    }

    pub fn format(self, format: impl Into<String>) -> Self {
        self.arg("-f").arg(format)
    }

    pub fn restrict_filenames(self) -> Self {
        self.arg("--restrict-filenames")
    }

    pub fn no_playlist(self) -> Self {
        self.arg("--no-playlist")
    }

    pub fn playlist_items(self, spec: impl Into<String>) -> Self {
        self.arg("--playlist-items").arg(spec)
    }

    pub fn cookies_file(self, path: impl AsRef<Path>) -> Self {
        self.arg("--cookies").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn cookies_file_opt(self, path: Option<&PathBuf>) -> Self {
        match path {
            Some(p) => self.cookies_file(p),
            None => self
        }
    }

    pub fn ffmpeg_location(self, path: impl AsRef<Path>) -> Self {
        self.arg("--ffmpeg-location").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn ffmpeg_location_opt(self, path: Option<&PathBuf>) -> Self {
        match path {
            Some(p) => self.ffmpeg_location(p),
            None => self
        }
    }

    pub fn no_warnings(self) -> Self {
        self.arg("--no-warnings")
    }

    /// Keeps progress output even though `--print` puts yt-dlp in quiet mode.
    pub fn force_progress(self) -> Self {
        self.arg("--progress")
    }

    pub fn newline_progress(self) -> Self {
        self.arg("--newline")
    }

    pub fn progress_template(self, template: impl Into<String>) -> Self {
        self.arg("--progress-template").arg(template)
    }

    pub fn print(self, when_template: impl Into<String>) -> Self {
        self.arg("--print").arg(when_template)
    }

    /// Machine-readable progress and final-path reporting on stdout.
    pub fn report_progress(self) -> Self {
        self.force_progress()
            .newline_progress()
            .progress_template(format!(
                "download:{PROGRESS_MARKER} %(progress._percent_str)s %(progress._total_bytes_str)s %(progress._speed_str)s %(progress._eta_str)s"
            ))
            .print(format!("after_move:{SAVED_MARKER} %(filepath)s"))
    }

    pub fn with_options(mut self, options: &DownloadOptions) -> Self {
        if let Some(ref format) = options.format {
            self = self.format(format.clone());
        }

        if options.restrict_filenames {
            self = self.restrict_filenames();
        }

        if options.single_item {
            self = self.no_playlist().playlist_items("1");
        }

        self
    }

    pub fn build_with_env(&self, env_vars: &HashMap<String, String>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args);

        if let Some(path_prepend) = env_vars.get("PATH_PREPEND") {
            let current_path = std::env::var("PATH").unwrap_or_default();
            cmd.env("PATH", format!("{path_prepend}:{current_path}"));
        }

        for (key, value) in env_vars {
            if key != "PATH_PREPEND" {
                cmd.env(key, value);
            }
        }

        cmd
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }
}
