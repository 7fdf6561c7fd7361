use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    settings::{Preferences, SettingsProvider},
};

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Preferences kept in memory and mirrored to a pretty-printed JSON file.
pub struct FileSettings {
    path: Option<PathBuf>,
    prefs: RwLock<Preferences>,
    goal_tx: watch::Sender<i32>,
    notifications_tx: watch::Sender<bool>,
}

impl FileSettings {
    pub fn in_memory(prefs: Preferences) -> Self {
        Self::with_path(None, prefs)
    }

    /// Loads `settings.json` from `dir`, falling back to defaults when it has
    /// never been written.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE_NAME);

        let prefs = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            info!("No settings at {:?}, using defaults", path);
            Preferences::default()
        };

        Ok(Self::with_path(Some(path), prefs))
    }

    fn with_path(path: Option<PathBuf>, prefs: Preferences) -> Self {
        let (goal_tx, _) = watch::channel(prefs.daily_goal);
        let (notifications_tx, _) = watch::channel(prefs.notifications_enabled);

        Self {
            path,
            prefs: RwLock::new(prefs),
            goal_tx,
            notifications_tx,
        }
    }

    fn save(&self, prefs: &Preferences) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(prefs)?)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl SettingsProvider for FileSettings {
    fn preferences(&self) -> Preferences {
        self.prefs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, edit: &mut dyn FnMut(&mut Preferences)) -> Result<()> {
        let mut prefs = self.prefs.write().unwrap_or_else(PoisonError::into_inner);

        let mut next = prefs.clone();
        edit(&mut next);
        if next == *prefs {
            return Ok(());
        }

        if let Err(e) = self.save(&next) {
            warn!("Unable to save settings: {e}");
            return Err(e);
        }
        debug!(?next, "Settings updated");

        let goal = next.daily_goal;
        let enabled = next.notifications_enabled;
        *prefs = next;

        self.goal_tx.send_if_modified(|current| {
            let changed = *current != goal;
            *current = goal;
            changed
        });
        self.notifications_tx.send_if_modified(|current| {
            let changed = *current != enabled;
            *current = enabled;
            changed
        });
        Ok(())
    }

    fn watch_daily_goal(&self) -> watch::Receiver<i32> {
        self.goal_tx.subscribe()
    }

    fn watch_notifications_enabled(&self) -> watch::Receiver<bool> {
        self.notifications_tx.subscribe()
    }
}
