use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ActivityLevel {
    Low,
    #[default]
    Moderate,
    High,
}

impl ActivityLevel {
    /// Milliliters of water per kilogram of body weight per day.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Low => 30.0,
            Self::Moderate => 35.0,
            Self::High => 40.0,
        }
    }

    /// Case-insensitive. Anything unrecognised is treated as moderate.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Moderate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

impl From<&str> for ActivityLevel {
    fn from(value: &str) -> Self {
        Self::from_name(value)
    }
}

impl From<String> for ActivityLevel {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Daily water target in milliliters, truncated toward zero.
pub fn daily_goal(weight_kg: f64, activity_level: ActivityLevel) -> i32 {
    (weight_kg * activity_level.multiplier()) as i32
}

/// Fraction of `goal` reached, clamped to `0.0..=1.0`.
pub fn progress(total: i64, goal: i32) -> f64 {
    if goal <= 0 {
        return 0.0;
    }
    (total as f64 / f64::from(goal)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_for_seventy_kilograms() {
        assert_eq!(daily_goal(70.0, ActivityLevel::Low), 2100);
        assert_eq!(daily_goal(70.0, ActivityLevel::Moderate), 2450);
        assert_eq!(daily_goal(70.0, ActivityLevel::High), 2800);
    }

    #[test]
    fn goal_truncates_instead_of_rounding() {
        // 72.5 * 35 = 2537.5
        assert_eq!(daily_goal(72.5, ActivityLevel::Moderate), 2537);
        // 60.99 * 40 = 2439.6
        assert_eq!(daily_goal(60.99, ActivityLevel::High), 2439);
    }

    #[test]
    fn unknown_level_is_moderate() {
        assert_eq!(ActivityLevel::from_name("athlete"), ActivityLevel::Moderate);
        assert_eq!(ActivityLevel::from_name(""), ActivityLevel::Moderate);
        assert_eq!(
            daily_goal(70.0, ActivityLevel::from("sedentary")),
            daily_goal(70.0, ActivityLevel::Moderate)
        );
    }

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(ActivityLevel::from_name("HIGH"), ActivityLevel::High);
        assert_eq!(ActivityLevel::from_name(" Low "), ActivityLevel::Low);
    }

    #[test]
    fn stored_levels_decode_leniently() {
        let decode = |json: &str| serde_json::from_str::<ActivityLevel>(json).unwrap();

        assert_eq!(decode(r#""high""#), ActivityLevel::High);
        assert_eq!(decode(r#""Low""#), ActivityLevel::Low);
        assert_eq!(decode(r#""athlete""#), ActivityLevel::Moderate);
        assert_eq!(serde_json::to_string(&ActivityLevel::High).unwrap(), r#""high""#);
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress(1000, 2000), 0.5);
        assert_eq!(progress(5000, 2000), 1.0);
        assert_eq!(progress(-300, 2000), 0.0);
        assert_eq!(progress(500, 0), 0.0);
    }
}
