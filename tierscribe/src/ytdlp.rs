use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::proxy::ProxyOption;
use crate::strategy::{AudioDownloader, DownloadRequest, DownloadedAudio};
use crate::video::VideoRef;

/// Smallest audio-only stream; speech-to-text does not need fidelity.
const AUDIO_FORMAT: &str = "worstaudio[ext=m4a]/worstaudio";
const ALTERNATE_CLIENTS: &str = "android,ios,tv";
const SOCKET_TIMEOUT_SECS: &str = "30";

/// Audio downloads and info dumps through the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    player_clients: Option<String>,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::primary()
    }
}

impl YtDlp {
    /// yt-dlp's own client selection.
    pub fn primary() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            player_clients: None,
        }
    }

    /// Mobile and TV player clients, which YouTube often gates differently.
    pub fn alternate() -> Self {
        Self::primary().player_clients(ALTERNATE_CLIENTS)
    }

    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = path.into();
        self
    }

    pub fn player_clients(mut self, clients: impl Into<String>) -> Self {
        self.player_clients = Some(clients.into());
        self
    }

    /// Arguments shared by every invocation: egress, cookies, client selection.
    fn common_args(&self, egress: &ProxyOption, cookies: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            SOCKET_TIMEOUT_SECS.to_string(),
        ];
        if let Some(url) = egress.proxy_url() {
            args.push("--proxy".into());
            args.push(url.to_string());
        }
        if let Some(path) = cookies {
            args.push("--cookies".into());
            args.push(path.display().to_string());
        }
        if let Some(clients) = &self.player_clients {
            args.push("--extractor-args".into());
            args.push(format!("youtube:player_client={clients}"));
        }
        args
    }

    fn download_args(&self, request: &DownloadRequest<'_>) -> Vec<String> {
        let mut args = self.common_args(request.egress, request.cookies);
        let template = request.work_dir.join("%(id)s.%(ext)s");
        args.extend([
            "--format".to_string(),
            AUDIO_FORMAT.to_string(),
            "--no-exec".to_string(),
            "--no-progress".to_string(),
            "--output".to_string(),
            template.display().to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--print".to_string(),
            "after_move:duration".to_string(),
            "--print".to_string(),
            "after_move:title".to_string(),
            "--".to_string(),
            request.video.watch_url(),
        ]);
        args
    }

    async fn run(&self, args: &[String]) -> Result<Output> {
        debug!(binary = %self.binary.display(), args = ?redacted(args), "running yt-dlp");
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::YtDlpNotFound
                } else {
                    Error::Download(format!("failed to run yt-dlp: {e}"))
                }
            })?;

        if !output.status.success() {
            return Err(Error::Download(failure_message(&output)));
        }
        Ok(output)
    }

    /// The info JSON for a video, without downloading anything.
    pub(crate) async fn dump_json(
        &self,
        video: &VideoRef,
        egress: &ProxyOption,
        cookies: Option<&Path>,
    ) -> Result<serde_json::Value> {
        let mut args = self.common_args(egress, cookies);
        args.extend([
            "--dump-json".to_string(),
            "--skip-download".to_string(),
            "--".to_string(),
            video.watch_url(),
        ]);
        let output = self.run(&args).await?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl AudioDownloader for YtDlp {
    async fn download(&self, request: DownloadRequest<'_>) -> Result<DownloadedAudio> {
        let output = self.run(&self.download_args(&request)).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let audio = parse_printed(&stdout)?;
        ensure_within(request.work_dir, &audio.path)?;
        Ok(audio)
    }
}

/// Parse the three `--print after_move:` lines: path, duration, title.
fn parse_printed(stdout: &str) -> Result<DownloadedAudio> {
    let lines: Vec<&str> = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let &[path, duration, title] = &lines[lines.len().saturating_sub(3)..] else {
        return Err(Error::Download(format!(
            "unexpected yt-dlp output: {:?}",
            stdout.trim()
        )));
    };
    Ok(DownloadedAudio {
        path: PathBuf::from(path),
        duration_seconds: duration
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as u64),
        title: Some(title.to_string()).filter(|t| t != "NA"),
    })
}

/// The output must be a file inside the work dir, wherever yt-dlp claims it put it.
fn ensure_within(dir: &Path, path: &Path) -> Result<()> {
    let dir = dir.canonicalize()?;
    let resolved = path
        .canonicalize()
        .map_err(|e| Error::Download(format!("downloaded file missing: {}: {e}", path.display())))?;
    if !resolved.starts_with(&dir) || !resolved.is_file() {
        return Err(Error::Download(format!(
            "downloaded file escaped the work dir: {}",
            path.display()
        )));
    }
    Ok(())
}

/// The ERROR lines from yt-dlp's stderr, or its tail when there are none.
fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let errors: Vec<&str> = stderr
        .lines()
        .filter(|l| l.contains("ERROR"))
        .map(str::trim)
        .collect();
    if !errors.is_empty() {
        return errors.join("; ");
    }
    let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
    if tail.is_empty() {
        format!("yt-dlp exited with {}", output.status)
    } else {
        tail.into_iter().rev().collect::<Vec<_>>().join("; ")
    }
}

/// Args with the proxy URL masked.
fn redacted(args: &[String]) -> Vec<&str> {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        out.push(if mask_next { "<redacted>" } else { arg.as_str() });
        mask_next = arg == "--proxy";
    }
    out
}
