use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::strategy::AudioTrimmer;

/// Lines of ffmpeg's stderr kept in error messages.
const STDERR_TAIL: usize = 5;

/// Cuts preview clips with the `ffmpeg` binary, copying the stream as-is.
#[derive(Debug, Clone)]
pub struct FfmpegTrimmer {
    binary: PathBuf,
}

impl Default for FfmpegTrimmer {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTrimmer {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }

    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = path.into();
        self
    }
}

fn trim_args(source: &Path, dest: &Path, seconds: u64) -> Vec<String> {
    vec![
        "-nostdin".into(),
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        source.display().to_string(),
        "-t".into(),
        seconds.to_string(),
        "-c".into(),
        "copy".into(),
        dest.display().to_string(),
    ]
}

#[async_trait]
impl AudioTrimmer for FfmpegTrimmer {
    async fn trim(&self, source: &Path, dest: &Path, seconds: u64) -> Result<()> {
        debug!(source = %source.display(), seconds, "cutting clip");
        let output = Command::new(&self.binary)
            .args(trim_args(source, dest, seconds))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::Ffmpeg("ffmpeg not found - install with: apt install ffmpeg".into())
                } else {
                    Error::Ffmpeg(format!("failed to run ffmpeg: {e}"))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL)..].join("; ");
            return Err(Error::Ffmpeg(format!("ffmpeg failed: {tail}")));
        }
        if !tokio::fs::try_exists(dest).await? {
            return Err(Error::Ffmpeg("ffmpeg produced no output".into()));
        }
        Ok(())
    }
}
