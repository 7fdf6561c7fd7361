use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::Result,
    structs::{custom_cup::CustomCup, intake_event::IntakeEvent},
};

pub const HISTORY_FILE_NAME: &str = "history.bin";

/// Everything the event and cup stores persist.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct History {
    /// Kept sorted by timestamp
    pub intakes: Vec<IntakeEvent>,

    pub cups: Vec<CustomCup>,

    pub last_intake_id: u64,
    pub last_cup_id: u64,
}

/// Bincode snapshot of [`History`] on disk.
#[derive(Debug, Clone)]
pub struct HistoryFile {
    path: PathBuf,
}

impl HistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(HISTORY_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the saved history, creating an empty one on first run.
    pub fn load(&self) -> Result<History> {
        debug!("History path: {:?}", self.path);

        if let Some(dir) = self.path.parent() {
            if !dir.try_exists()? {
                fs::create_dir_all(dir)?;
            }
        }

        if self.path.exists() {
            let binary_data = fs::read(&self.path)?;
            let mut history: History = bincode::deserialize(&binary_data)?;
            history.intakes.sort_by_key(|e| e.timestamp);
            info!(
                intakes = history.intakes.len(),
                cups = history.cups.len(),
                "Loaded history"
            );
            return Ok(history);
        }

        // If the data file doesn't exist, create it and write the initial data to it
        let initial = History::default();
        self.save(&initial)?;
        Ok(initial)
    }

    /// Writes through a temporary file so a failed write never truncates the
    /// previous snapshot.
    pub fn save(&self, history: &History) -> Result<()> {
        let binary_data = bincode::serialize(history)?;
        let tmp_path = self.path.with_extension("bin.tmp");

        fs::write(&tmp_path, binary_data)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
