use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConstraintError;

/// Severity of a constraint and of the findings it produces, least severe
/// first so that `Ord` ranks `Critical` highest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Debug,
    Informational,
    Warning,
    #[default]
    Error,
    Critical,
}

impl Level {
    pub fn name(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Informational => "INFORMATIONAL",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    /// Findings at this level make a validation fail.
    pub fn is_failure(&self) -> bool {
        *self >= Level::Error
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(Level::Debug),
            "INFORMATIONAL" => Ok(Level::Informational),
            "WARNING" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" => Ok(Level::Critical),
            other => Err(ConstraintError::InvalidLevel(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Level::Critical > Level::Error);
        assert!(Level::Error > Level::Warning);
        assert!(Level::Warning > Level::Informational);
        assert!(Level::Informational > Level::Debug);
        assert!(Level::Error.is_failure());
        assert!(!Level::Warning.is_failure());
    }

    #[test]
    fn test_parse_and_serialize() {
        assert_eq!("WARNING".parse::<Level>().unwrap(), Level::Warning);
        assert!(matches!(
            "warning".parse::<Level>(),
            Err(ConstraintError::InvalidLevel(_))
        ));
        assert_eq!(
            serde_json::to_string(&Level::Informational).unwrap(),
            "\"INFORMATIONAL\""
        );
    }
}
