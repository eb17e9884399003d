//! Constraint declarations.
//!
//! Constraints arrive already parsed from a module loader. Construction
//! compiles every Metapath expression and pattern they carry exactly once;
//! a malformed expression fails here rather than during validation.
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use metaschema_metapath::MetapathExpression;
use metaschema_model::DataType;
use regex::Regex;

use crate::error::ConstraintError;
use crate::level::Level;
use crate::message::MessageTemplate;

fn compile(expression: &str) -> Result<MetapathExpression, ConstraintError> {
    MetapathExpression::compile(expression).map_err(|e| ConstraintError::metapath(expression, e))
}

/// A regular expression that must match an entire value.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, ConstraintError> {
        let regex = Regex::new(&format!("^(?:{})$", source)).map_err(|e| {
            ConstraintError::InvalidPattern {
                pattern: source.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Number of capture groups declared by the pattern, not counting the
    /// implicit whole-match group.
    pub fn group_count(&self) -> usize {
        self.regex.captures_len() - 1
    }

    /// The first capture group of a full match.
    pub fn first_group<'v>(&self, value: &'v str) -> Option<&'v str> {
        self.regex
            .captures(value)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One component of an index key: an expression evaluated against the
/// indexed node, optionally narrowed by a pattern's first capture group.
#[derive(Debug, Clone)]
pub struct KeyField {
    pub target: MetapathExpression,
    pub pattern: Option<Pattern>,
}

impl KeyField {
    pub fn new(target: &str) -> Result<Self, ConstraintError> {
        Ok(Self {
            target: compile(target)?,
            pattern: None,
        })
    }

    pub fn with_pattern(target: &str, pattern: &str) -> Result<Self, ConstraintError> {
        Ok(Self {
            target: compile(target)?,
            pattern: Some(Pattern::new(pattern)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedValue {
    pub value: String,
    pub description: Option<String>,
}

impl AllowedValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum ConstraintKind {
    AllowedValues {
        values: Vec<AllowedValue>,
        allow_other: bool,
    },
    /// At least one of `pattern` and `datatype` is set.
    Matches {
        pattern: Option<Pattern>,
        datatype: Option<DataType>,
    },
    Cardinality {
        min: Option<usize>,
        max: Option<usize>,
    },
    Index {
        name: String,
        key_fields: Vec<KeyField>,
    },
    Unique {
        key_fields: Vec<KeyField>,
    },
    IndexHasKey {
        index_name: String,
        key_fields: Vec<KeyField>,
    },
    Expect {
        test: MetapathExpression,
    },
}

impl ConstraintKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintKind::AllowedValues { .. } => "allowed-values",
            ConstraintKind::Matches { .. } => "matches",
            ConstraintKind::Cardinality { .. } => "cardinality",
            ConstraintKind::Index { .. } => "index",
            ConstraintKind::Unique { .. } => "unique",
            ConstraintKind::IndexHasKey { .. } => "index-has-key",
            ConstraintKind::Expect { .. } => "expect",
        }
    }
}

/// A constraint bound to a definition: `target` selects the nodes it applies
/// to, relative to each node of that definition.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub id: Option<String>,
    pub level: Level,
    pub target: MetapathExpression,
    pub message: Option<MessageTemplate>,
    pub remarks: Option<String>,
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn new(target: &str, kind: ConstraintKind) -> Result<Self, ConstraintError> {
        Ok(Self {
            id: None,
            level: Level::default(),
            target: compile(target)?,
            message: None,
            remarks: None,
            kind,
        })
    }

    pub fn allowed_values<I, S>(
        target: &str,
        values: I,
        allow_other: bool,
    ) -> Result<Self, ConstraintError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(AllowedValue::new).collect();
        Self::new(target, ConstraintKind::AllowedValues { values, allow_other })
    }

    pub fn matches_pattern(target: &str, pattern: &str) -> Result<Self, ConstraintError> {
        Self::new(
            target,
            ConstraintKind::Matches {
                pattern: Some(Pattern::new(pattern)?),
                datatype: None,
            },
        )
    }

    /// `datatype` is a Metaschema data type name such as `date-time` or `uuid`.
    pub fn matches_datatype(target: &str, datatype: &str) -> Result<Self, ConstraintError> {
        let datatype = DataType::from_name(datatype)
            .ok_or_else(|| ConstraintError::UnknownDataType(datatype.to_string()))?;
        Self::new(
            target,
            ConstraintKind::Matches {
                pattern: None,
                datatype: Some(datatype),
            },
        )
    }

    pub fn cardinality(
        target: &str,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Result<Self, ConstraintError> {
        Self::new(target, ConstraintKind::Cardinality { min, max })
    }

    pub fn index(
        target: &str,
        name: &str,
        key_fields: Vec<KeyField>,
    ) -> Result<Self, ConstraintError> {
        Self::new(
            target,
            ConstraintKind::Index {
                name: name.to_string(),
                key_fields,
            },
        )
    }

    pub fn unique(target: &str, key_fields: Vec<KeyField>) -> Result<Self, ConstraintError> {
        Self::new(target, ConstraintKind::Unique { key_fields })
    }

    pub fn index_has_key(
        target: &str,
        index_name: &str,
        key_fields: Vec<KeyField>,
    ) -> Result<Self, ConstraintError> {
        Self::new(
            target,
            ConstraintKind::IndexHasKey {
                index_name: index_name.to_string(),
                key_fields,
            },
        )
    }

    pub fn expect(target: &str, test: &str) -> Result<Self, ConstraintError> {
        Self::new(target, ConstraintKind::Expect { test: compile(test)? })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_message(mut self, template: &str) -> Result<Self, ConstraintError> {
        self.message = Some(MessageTemplate::parse(template)?);
        Ok(self)
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    /// The id, or `?` for anonymous constraints.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("?")
    }

    pub fn allows_other_values(&self) -> bool {
        matches!(self.kind, ConstraintKind::AllowedValues { allow_other: true, .. })
    }

    /// Whether `value` is one of this constraint's enumerated values.
    pub fn allows_value(&self, value: &str) -> bool {
        match &self.kind {
            ConstraintKind::AllowedValues { values, .. } => values.iter().any(|v| v.value == value),
            _ => false,
        }
    }
}

/// Constraints keyed by the name of the definition they are declared on.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    by_definition: IndexMap<String, Vec<Arc<Constraint>>>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, definition: impl Into<String>, constraint: Constraint) -> &mut Self {
        self.by_definition
            .entry(definition.into())
            .or_default()
            .push(Arc::new(constraint));
        self
    }

    pub fn with(mut self, definition: impl Into<String>, constraint: Constraint) -> Self {
        self.add(definition, constraint);
        self
    }

    pub fn constraints_for(&self, definition: &str) -> &[Arc<Constraint>] {
        self.by_definition
            .get(definition)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &str> {
        self.by_definition.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_definition.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matches_whole_value() {
        let pattern = Pattern::new("[a-z]+-(\\d+)").unwrap();
        assert!(pattern.is_match("ac-12"));
        assert!(!pattern.is_match("ac-12x"));
        assert_eq!(pattern.group_count(), 1);
        assert_eq!(pattern.first_group("ac-12"), Some("12"));
        assert_eq!(pattern.as_str(), "[a-z]+-(\\d+)");
        assert!(matches!(
            Pattern::new("("),
            Err(ConstraintError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_constructors_compile_expressions() {
        let constraint = Constraint::expect(".", "count(control) > 0")
            .unwrap()
            .with_id("has-controls")
            .with_level(Level::Warning);
        assert_eq!(constraint.display_id(), "has-controls");
        assert_eq!(constraint.level, Level::Warning);
        assert_eq!(constraint.kind.name(), "expect");
        assert!(matches!(
            Constraint::expect(".", "count(").unwrap_err(),
            ConstraintError::Metapath { .. }
        ));
        assert!(matches!(
            Constraint::matches_datatype("@id", "no-such-type").unwrap_err(),
            ConstraintError::UnknownDataType(_)
        ));
    }

    #[test]
    fn test_allowed_values_lookup() {
        let constraint = Constraint::allowed_values("@type", ["a", "b"], false).unwrap();
        assert!(constraint.allows_value("a"));
        assert!(!constraint.allows_value("c"));
        assert!(!constraint.allows_other_values());
        assert_eq!(constraint.display_id(), "?");
    }

    #[test]
    fn test_set_groups_by_definition() {
        let set = ConstraintSet::new()
            .with("catalog", Constraint::cardinality("group", Some(1), None).unwrap())
            .with("catalog", Constraint::expect(".", "true()").unwrap())
            .with("control", Constraint::matches_pattern("@id", "[a-z]+").unwrap());
        assert_eq!(set.len(), 3);
        assert_eq!(set.constraints_for("catalog").len(), 2);
        assert!(set.constraints_for("missing").is_empty());
        assert_eq!(set.definitions().collect::<Vec<_>>(), vec!["catalog", "control"]);
    }
}
