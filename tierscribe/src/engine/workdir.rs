use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A scratch directory owned by one resolution, removed when dropped.
#[derive(Debug)]
pub(crate) struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// Create a unique directory under `root`. Concurrent resolutions in the same
    /// process never share one.
    pub(crate) fn create(root: &Path) -> std::io::Result<Self> {
        let path = root.join(format!(
            "tierscribe-{}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos(),
            SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to clean up temp dir");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_and_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let a = WorkDir::create(root.path()).unwrap();
        let b = WorkDir::create(root.path()).unwrap();
        assert_ne!(a.path(), b.path());
        std::fs::write(a.path().join("audio.m4a"), b"x").unwrap();

        let kept = a.path().to_path_buf();
        drop(a);
        assert!(!kept.exists());
        assert!(b.path().exists());
    }
}
