use serde::Serialize;

use crate::error::ConstraintError;
use crate::level::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    Cardinality,
    Index,
    Unique,
    IndexHasKey,
    Matches,
    AllowedValues,
    Expect,
    EvaluationError,
    Pass,
}

/// A single reported outcome of applying a constraint to a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub kind: FindingKind,
    pub level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_id: Option<String>,
    /// Location of the node the finding is about.
    pub target_path: String,
    pub message: String,
}

impl Finding {
    pub fn is_violation(&self) -> bool {
        self.kind != FindingKind::Pass
    }
}

/// Every finding of a validation pass and the most severe violation level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub findings: Vec<Finding>,
    pub highest_level: Level,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            findings: Vec::new(),
            highest_level: Level::Informational,
        }
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, finding: Finding) {
        if finding.is_violation() && finding.level > self.highest_level {
            self.highest_level = finding.level;
        }
        self.findings.push(finding);
    }

    /// `true` unless a violation at `ERROR` or above was recorded.
    pub fn is_passing(&self) -> bool {
        !self.highest_level.is_failure()
    }

    pub fn violations(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_violation())
    }

    pub fn count_at_least(&self, level: Level) -> usize {
        self.violations().filter(|f| f.level >= level).count()
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, ConstraintError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(kind: FindingKind, level: Level) -> Finding {
        Finding {
            kind,
            level,
            constraint_id: None,
            target_path: "/catalog[1]".to_string(),
            message: "message".to_string(),
        }
    }

    #[test]
    fn test_highest_level_ignores_passes() {
        let mut result = ValidationResult::new();
        assert!(result.is_passing());
        result.push(finding(FindingKind::Pass, Level::Critical));
        assert_eq!(result.highest_level, Level::Informational);
        result.push(finding(FindingKind::Expect, Level::Warning));
        assert!(result.is_passing());
        result.push(finding(FindingKind::Matches, Level::Error));
        assert!(!result.is_passing());
        assert_eq!(result.highest_level, Level::Error);
        assert_eq!(result.count_at_least(Level::Warning), 2);
    }

    #[test]
    fn test_json_report() {
        let mut result = ValidationResult::new();
        let mut f = finding(FindingKind::IndexHasKey, Level::Error);
        f.constraint_id = Some("ref-check".to_string());
        result.push(f);
        let json = result.to_json(false).unwrap();
        assert!(json.contains("\"kind\":\"index-has-key\""));
        assert!(json.contains("\"level\":\"ERROR\""));
        assert!(json.contains("\"constraintId\":\"ref-check\""));
        assert!(json.contains("\"highestLevel\":\"ERROR\""));
        let value: serde_json::Value =
            serde_json::from_str(&result.to_json(true).unwrap()).unwrap();
        assert_eq!(value["findings"][0]["targetPath"], "/catalog[1]");
    }
}
