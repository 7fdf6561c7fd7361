use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Label used for the synthetic events that reconcile a manually set total.
pub const MANUAL_ADJUSTMENT_LABEL: &str = "Manual Adjustment";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IntakeEvent {
    /// Assigned by the store on append
    pub id: u64,

    /// Amount of water drank in milliliters. Negative for downward corrections
    pub volume: i32,

    /// Milliseconds since the unix epoch of when the drink was recorded
    pub timestamp: i64,

    /// Cup or source the drink came from
    pub label: String,
}

/// An event that has not been given an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIntake {
    pub volume: i32,
    pub timestamp: i64,
    pub label: String,
}

impl NewIntake {
    pub fn new(volume: i32, timestamp: i64, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        if volume == 0 {
            return Err(Error::invalid("intake volume must not be zero"));
        }
        if label.trim().is_empty() {
            return Err(Error::invalid("intake label must not be blank"));
        }

        Ok(Self {
            volume,
            timestamp,
            label,
        })
    }

    pub(crate) fn with_id(self, id: u64) -> IntakeEvent {
        IntakeEvent {
            id,
            volume: self.volume,
            timestamp: self.timestamp,
            label: self.label,
        }
    }
}

impl IntakeEvent {
    pub fn is_correction(&self) -> bool {
        self.label == MANUAL_ADJUSTMENT_LABEL
    }
}
