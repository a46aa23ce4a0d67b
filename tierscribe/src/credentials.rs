use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::debug;

/// Point-in-time view of the cookie file.
///
/// Cookies are exported by hand and replaced while the process runs, so validity is
/// re-evaluated explicitly (once per resolution) instead of being cached at startup.
#[derive(Debug, Clone)]
pub struct CredentialStatus {
    pub path: PathBuf,
    pub valid: bool,
    pub checked_at: SystemTime,
}

impl CredentialStatus {
    pub fn evaluate(path: &Path) -> Self {
        let valid = has_youtube_cookies(path);
        debug!(path = %path.display(), valid, "evaluated cookie file");
        Self {
            path: path.to_path_buf(),
            valid,
            checked_at: SystemTime::now(),
        }
    }

    /// A status that never offers cookies.
    pub fn none() -> Self {
        Self {
            path: PathBuf::new(),
            valid: false,
            checked_at: SystemTime::now(),
        }
    }

    /// The cookie file, only if it looked usable when checked.
    pub fn cookies(&self) -> Option<&Path> {
        self.valid.then_some(self.path.as_path())
    }

    pub fn age(&self) -> Duration {
        self.checked_at.elapsed().unwrap_or_default()
    }

    /// Re-check if the last evaluation is older than `max_age`.
    pub fn refreshed(self, max_age: Duration) -> Self {
        if self.age() > max_age && !self.path.as_os_str().is_empty() {
            Self::evaluate(&self.path)
        } else {
            self
        }
    }
}

/// A Netscape cookie export counts only if it carries the YouTube auth cookie.
fn has_youtube_cookies(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(content) => content.contains(".youtube.com") && content.contains("SAPISID"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_missing_file_is_invalid() {
        let status = CredentialStatus::evaluate(Path::new("/nonexistent/cookies.txt"));
        assert!(!status.valid);
        assert!(status.cookies().is_none());
    }

    #[test]
    fn test_valid_cookie_export() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\tTRUE\t0\tSAPISID\tabc"
        )
        .unwrap();
        let status = CredentialStatus::evaluate(file.path());
        assert!(status.valid);
        assert_eq!(status.cookies(), Some(file.path()));
    }

    #[test]
    fn test_cookie_export_without_auth_cookie() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, ".youtube.com\tTRUE\t/\tTRUE\t0\tPREF\tx").unwrap();
        assert!(!CredentialStatus::evaluate(file.path()).valid);
    }

    #[test]
    fn test_refresh_picks_up_new_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let status = CredentialStatus::evaluate(file.path());
        assert!(!status.valid);

        writeln!(file, ".youtube.com SAPISID x").unwrap();
        assert!(!status.clone().refreshed(Duration::from_secs(3600)).valid);
        assert!(status.refreshed(Duration::ZERO).valid);
    }
}
