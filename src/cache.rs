use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Log file written by the tracing subscriber
pub const LOG_FILE: &str = "csvduck.log";

/// Files owned by the app; `clear_all` removes only these
const OWNED_FILES: &[&str] = &[LOG_FILE];

/// Per-user cache directory (currently just the log file)
#[derive(Clone)]
pub struct CacheManager {
    pub(crate) cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(app_name: &str) -> Result<Self> {
        dirs::cache_dir()
            .map(|base| Self::with_dir(base.join(app_name)))
            .ok_or_else(|| eyre!("No cache directory available on this platform"))
    }

    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_file(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }

    pub fn log_file(&self) -> PathBuf {
        self.cache_file(LOG_FILE)
    }

    pub fn ensure_cache_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| eyre!("Cannot create {}: {}", self.cache_dir.display(), e))
    }

    /// Delete the app's files; returns how many existed and were removed
    pub fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        for path in OWNED_FILES.iter().map(|name| self.cache_file(name)) {
            if !path.exists() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove"),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clear_all_removes_log() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::with_dir(dir.path().join("csvduck"));
        cache.ensure_cache_dir().unwrap();
        fs::write(cache.log_file(), "line\n").unwrap();
        fs::write(cache.cache_file("keep.txt"), "x").unwrap();
        assert_eq!(cache.clear_all().unwrap(), 1);
        assert!(!cache.log_file().exists());
        assert!(cache.cache_file("keep.txt").exists());
        assert_eq!(cache.clear_all().unwrap(), 0);
    }

    #[test]
    fn test_clear_all_without_directory() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::with_dir(dir.path().join("missing"));
        assert_eq!(cache.clear_all().unwrap(), 0);
    }
}
