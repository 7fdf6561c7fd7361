use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;

use crate::{error::Result, storage::HistoryFile};

/// Points the app at another data directory, mostly for testing.
pub const DATA_DIR_ENV: &str = "HYDRATE_DATA_DIR";

const LOG_DIR_NAME: &str = "logs";

/// Where the history, settings and logs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    /// `$HYDRATE_DATA_DIR` if set, otherwise the platform data directory.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with(env::var_os(DATA_DIR_ENV).map(PathBuf::from))
    }

    pub fn resolve_with(data_dir: Option<PathBuf>) -> Result<Self> {
        if let Some(data_dir) = data_dir.filter(|d| !d.as_os_str().is_empty()) {
            return Ok(Self::at(data_dir));
        }

        let dirs = ProjectDirs::from("org", "hydrate", "hydrate-tracker").ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "unable to find a home directory")
        })?;
        Ok(Self::at(dirs.data_dir()))
    }

    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Creates the data and log directories if they are missing.
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(self.log_dir())?;
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }

    pub fn history_file(&self) -> HistoryFile {
        HistoryFile::in_dir(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{settings::file::SETTINGS_FILE_NAME, storage::HISTORY_FILE_NAME};
    use tempfile::TempDir;

    #[test]
    fn override_wins_over_platform_dirs() {
        let paths = AppPaths::resolve_with(Some("/tmp/hydrate-elsewhere".into())).unwrap();
        assert_eq!(paths.data_dir(), Path::new("/tmp/hydrate-elsewhere"));
        assert_eq!(paths.log_dir(), Path::new("/tmp/hydrate-elsewhere/logs"));
    }

    #[test]
    fn empty_override_is_ignored() {
        if let Ok(paths) = AppPaths::resolve_with(Some(PathBuf::new())) {
            assert!(!paths.data_dir().as_os_str().is_empty());
        }
    }

    #[test]
    fn create_makes_every_directory() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::at(dir.path().join("nested").join("data"));

        paths.create().unwrap();
        assert!(paths.data_dir().is_dir());
        assert!(paths.log_dir().is_dir());
        assert_eq!(
            paths.history_file().path(),
            paths.data_dir().join(HISTORY_FILE_NAME)
        );
        assert!(!paths.data_dir().join(SETTINGS_FILE_NAME).exists());
    }
}
