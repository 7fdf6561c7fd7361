use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named cup size the user can drink from with one tap.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CustomCup {
    pub id: u64,
    pub name: String,
    /// Always positive, in milliliters
    pub volume: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCup {
    pub name: String,
    pub volume: i32,
}

fn validate(name: &str, volume: i32) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid("cup name must not be blank"));
    }
    if volume <= 0 {
        return Err(Error::invalid(format!(
            "cup volume must be positive, got {volume}"
        )));
    }
    Ok(())
}

impl NewCup {
    pub fn new(name: impl Into<String>, volume: i32) -> Result<Self> {
        let name = name.into().trim().to_string();
        validate(&name, volume)?;
        Ok(Self { name, volume })
    }

    pub(crate) fn with_id(self, id: u64) -> CustomCup {
        CustomCup {
            id,
            name: self.name,
            volume: self.volume,
        }
    }
}

impl CustomCup {
    pub fn validate(&self) -> Result<()> {
        validate(&self.name, self.volume)
    }
}
