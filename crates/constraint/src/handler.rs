//! Reporting of constraint outcomes.
//!
//! The validator never fails on a violation; it describes each one to a
//! [`ValidationHandler`]. [`FindingCollectingHandler`] turns the callbacks into
//! [`Finding`]s with the standard messages, or a constraint's own message
//! template when it declares one.
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use metaschema_metapath::DynamicContext;
use metaschema_model::{DataType, NodeRef, PathFormatter};

use crate::config::{PathFormat, ValidationConfig};
use crate::constraint::{Constraint, ConstraintKind, Pattern};
use crate::error::ConstraintError;
use crate::finding::{Finding, FindingKind, ValidationResult};
use crate::index::Key;
use crate::level::Level;
use crate::message::join_with_oxford_comma;
use crate::validator::lexical_value;

/// A constraint together with the node it was applied at.
#[derive(Clone, Copy)]
pub struct ConstraintScope<'a> {
    pub constraint: &'a Constraint,
    /// The node whose definition declares the constraint.
    pub node: &'a NodeRef,
    pub dynamic: &'a DynamicContext,
}

pub trait ValidationHandler {
    fn handle_cardinality_minimum(&mut self, scope: ConstraintScope<'_>, targets: &[NodeRef]);

    fn handle_cardinality_maximum(&mut self, scope: ConstraintScope<'_>, targets: &[NodeRef]);

    fn handle_index_duplicate_key(
        &mut self,
        scope: ConstraintScope<'_>,
        old: &NodeRef,
        new: &NodeRef,
    );

    fn handle_unique_violation(&mut self, scope: ConstraintScope<'_>, old: &NodeRef, new: &NodeRef);

    /// A second index with an already defined name.
    fn handle_index_duplicate_name(&mut self, scope: ConstraintScope<'_>);

    fn handle_index_miss(&mut self, scope: ConstraintScope<'_>, target: &NodeRef, key: &Key);

    /// An index-has-key constraint names an index no constraint defined.
    fn handle_missing_index(&mut self, scope: ConstraintScope<'_>, target: &NodeRef, message: &str);

    fn handle_match_pattern(
        &mut self,
        scope: ConstraintScope<'_>,
        target: &NodeRef,
        value: &str,
        pattern: &Pattern,
    );

    fn handle_match_datatype(
        &mut self,
        scope: ConstraintScope<'_>,
        target: &NodeRef,
        value: &str,
        datatype: DataType,
    );

    fn handle_expect(&mut self, scope: ConstraintScope<'_>, target: &NodeRef);

    /// `constraints` are every allowed-values constraint that targeted the
    /// node; none of them accepted its value.
    fn handle_allowed_values(
        &mut self,
        constraints: &[Arc<Constraint>],
        target: &NodeRef,
        ctx: &DynamicContext,
    );

    /// Evaluating the constraint failed; the pass continues.
    fn handle_error(&mut self, scope: ConstraintScope<'_>, error: &ConstraintError);

    fn handle_pass(&mut self, scope: ConstraintScope<'_>, target: &NodeRef);
}

#[derive(Debug)]
struct Suppressed {
    kind: FindingKind,
    level: Level,
    constraint_id: Option<String>,
    target_path: String,
    count: usize,
}

/// Collects findings into a [`ValidationResult`].
pub struct FindingCollectingHandler {
    path_format: PathFormat,
    max_per_constraint: Option<usize>,
    result: ValidationResult,
    // Constraints stay behind an `Arc` for the whole pass, so their address
    // identifies them.
    reported: HashMap<usize, usize>,
    suppressed: IndexMap<usize, Suppressed>,
}

impl Default for FindingCollectingHandler {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}

impl FindingCollectingHandler {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            path_format: config.path_format,
            max_per_constraint: config.max_findings_per_constraint,
            result: ValidationResult::new(),
            reported: HashMap::new(),
            suppressed: IndexMap::new(),
        }
    }

    pub fn result(&self) -> &ValidationResult {
        &self.result
    }

    /// The collected findings, followed by one summary finding per constraint
    /// that exceeded the configured maximum.
    pub fn into_result(mut self) -> ValidationResult {
        for (_, suppressed) in std::mem::take(&mut self.suppressed) {
            self.result.push(Finding {
                kind: suppressed.kind,
                level: suppressed.level,
                message: format!(
                    "{} additional findings for constraint '{}' were not reported",
                    suppressed.count,
                    suppressed.constraint_id.as_deref().unwrap_or("?")
                ),
                constraint_id: suppressed.constraint_id,
                target_path: suppressed.target_path,
            });
        }
        self.result
    }

    fn formatter(&self) -> &'static dyn PathFormatter {
        self.path_format.formatter()
    }

    fn path(&self, node: &NodeRef) -> String {
        node.to_path(self.formatter())
    }

    /// The constraint's own message rendered against `target`, or `default`.
    fn message(
        &self,
        scope: ConstraintScope<'_>,
        target: &NodeRef,
        default: impl FnOnce() -> String,
    ) -> String {
        let Some(template) = &scope.constraint.message else {
            return default();
        };
        match template.render(target, scope.dynamic) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Failed to render message template '{}': {}", template, e);
                default()
            }
        }
    }

    fn record(
        &mut self,
        constraint: &Constraint,
        kind: FindingKind,
        level: Level,
        target: &NodeRef,
        message: String,
    ) {
        let key = constraint as *const Constraint as usize;
        let count = self.reported.entry(key).or_insert(0);
        *count += 1;
        if let Some(max) = self.max_per_constraint
            && *count > max
        {
            let target_path = self.path(target);
            self.suppressed
                .entry(key)
                .or_insert_with(|| Suppressed {
                    kind,
                    level,
                    constraint_id: constraint.id.clone(),
                    target_path,
                    count: 0,
                })
                .count += 1;
            return;
        }
        self.result.push(Finding {
            kind,
            level,
            constraint_id: constraint.id.clone(),
            target_path: self.path(target),
            message,
        });
    }
}

fn cardinality_bounds(constraint: &Constraint) -> (usize, usize) {
    match constraint.kind {
        ConstraintKind::Cardinality { min, max } => (min.unwrap_or(0), max.unwrap_or(usize::MAX)),
        _ => (0, usize::MAX),
    }
}

fn index_name(constraint: &Constraint) -> &str {
    match &constraint.kind {
        ConstraintKind::Index { name, .. } => name,
        ConstraintKind::IndexHasKey { index_name, .. } => index_name,
        _ => "",
    }
}

fn lexical_string(node: &NodeRef) -> String {
    lexical_value(node).unwrap_or_default()
}

impl ValidationHandler for FindingCollectingHandler {
    fn handle_cardinality_minimum(&mut self, scope: ConstraintScope<'_>, targets: &[NodeRef]) {
        let (min, _) = cardinality_bounds(scope.constraint);
        let message = self.message(scope, scope.node, || {
            format!(
                "The cardinality '{}' is below the required minimum '{}' for items matching '{}'.",
                targets.len(),
                min,
                scope.constraint.target
            )
        });
        self.record(
            scope.constraint,
            FindingKind::Cardinality,
            scope.constraint.level,
            scope.node,
            message,
        );
    }

    fn handle_cardinality_maximum(&mut self, scope: ConstraintScope<'_>, targets: &[NodeRef]) {
        let (_, max) = cardinality_bounds(scope.constraint);
        let paths: Vec<String> = targets.iter().map(|t| format!("'{}'", self.path(t))).collect();
        let message = self.message(scope, scope.node, || {
            format!(
                "The cardinality '{}' is greater than the required maximum '{}' at: {}.",
                targets.len(),
                max,
                join_with_oxford_comma(&paths, "and")
            )
        });
        self.record(
            scope.constraint,
            FindingKind::Cardinality,
            scope.constraint.level,
            scope.node,
            message,
        );
    }

    fn handle_index_duplicate_key(
        &mut self,
        scope: ConstraintScope<'_>,
        old: &NodeRef,
        new: &NodeRef,
    ) {
        let message = self.message(scope, new, || {
            format!(
                "Index '{}' has duplicate key for items at paths '{}' and '{}'",
                index_name(scope.constraint),
                self.path(old),
                self.path(new)
            )
        });
        self.record(scope.constraint, FindingKind::Index, scope.constraint.level, new, message);
    }

    fn handle_unique_violation(
        &mut self,
        scope: ConstraintScope<'_>,
        old: &NodeRef,
        new: &NodeRef,
    ) {
        let message = self.message(scope, new, || {
            format!(
                "Unique constraint violation at paths '{}' and '{}'",
                self.path(old),
                self.path(new)
            )
        });
        self.record(scope.constraint, FindingKind::Unique, scope.constraint.level, new, message);
    }

    fn handle_index_duplicate_name(&mut self, scope: ConstraintScope<'_>) {
        let message = format!(
            "Duplicate index named '{}' found at path '{}'",
            index_name(scope.constraint),
            self.path(scope.node)
        );
        self.record(
            scope.constraint,
            FindingKind::Index,
            scope.constraint.level,
            scope.node,
            message,
        );
    }

    fn handle_index_miss(&mut self, scope: ConstraintScope<'_>, target: &NodeRef, key: &Key) {
        let key_values: Vec<&str> = key.iter().map(|k| k.as_deref().unwrap_or("")).collect();
        let message = self.message(scope, target, || {
            format!(
                "Key reference [{}] not found in index '{}' for item at path '{}'",
                key_values.join(","),
                index_name(scope.constraint),
                self.path(target)
            )
        });
        self.record(
            scope.constraint,
            FindingKind::IndexHasKey,
            scope.constraint.level,
            target,
            message,
        );
    }

    fn handle_missing_index(
        &mut self,
        scope: ConstraintScope<'_>,
        target: &NodeRef,
        message: &str,
    ) {
        let message = format!(
            "{} for constraint '{}' for item at path '{}'",
            message,
            scope.constraint.display_id(),
            self.path(target)
        );
        self.record(
            scope.constraint,
            FindingKind::IndexHasKey,
            scope.constraint.level,
            target,
            message,
        );
    }

    fn handle_match_pattern(
        &mut self,
        scope: ConstraintScope<'_>,
        target: &NodeRef,
        value: &str,
        pattern: &Pattern,
    ) {
        let message = self.message(scope, target, || {
            format!(
                "Value '{}' did not match the pattern '{}' at path '{}'",
                value,
                pattern,
                self.path(target)
            )
        });
        self.record(
            scope.constraint,
            FindingKind::Matches,
            scope.constraint.level,
            target,
            message,
        );
    }

    fn handle_match_datatype(
        &mut self,
        scope: ConstraintScope<'_>,
        target: &NodeRef,
        value: &str,
        datatype: DataType,
    ) {
        let message = self.message(scope, target, || {
            format!(
                "Value '{}' did not conform to the data type '{}' at path '{}'",
                value,
                datatype.name(),
                self.path(target)
            )
        });
        self.record(
            scope.constraint,
            FindingKind::Matches,
            scope.constraint.level,
            target,
            message,
        );
    }

    fn handle_expect(&mut self, scope: ConstraintScope<'_>, target: &NodeRef) {
        let message = self.message(scope, target, || {
            let test = match &scope.constraint.kind {
                ConstraintKind::Expect { test } => test.source(),
                _ => "",
            };
            format!(
                "Expect constraint '{}' did not match the data at path '{}'",
                test,
                self.path(target)
            )
        });
        self.record(scope.constraint, FindingKind::Expect, scope.constraint.level, target, message);
    }

    fn handle_allowed_values(
        &mut self,
        constraints: &[Arc<Constraint>],
        target: &NodeRef,
        ctx: &DynamicContext,
    ) {
        let Some(first) = constraints.first() else {
            return;
        };
        let level = constraints.iter().map(|c| c.level).max().unwrap_or(first.level);
        let custom = constraints.iter().find(|c| c.message.is_some()).unwrap_or(first);
        let scope = ConstraintScope {
            constraint: custom,
            node: target,
            dynamic: ctx,
        };
        let message = self.message(scope, target, || {
            let mut values: Vec<&str> = constraints
                .iter()
                .flat_map(|c| match &c.kind {
                    ConstraintKind::AllowedValues { values, .. } => values.as_slice(),
                    _ => &[][..],
                })
                .map(|v| v.value.as_str())
                .collect();
            values.sort_unstable();
            values.dedup();
            format!(
                "Value '{}' doesn't match one of '{}' at path '{}'",
                lexical_string(target),
                join_with_oxford_comma(&values, "or"),
                self.path(target)
            )
        });
        self.record(first, FindingKind::AllowedValues, level, target, message);
    }

    fn handle_error(&mut self, scope: ConstraintScope<'_>, error: &ConstraintError) {
        log::warn!(
            "Constraint '{}' failed to evaluate at '{}': {}",
            scope.constraint.display_id(),
            self.path(scope.node),
            error
        );
        self.record(
            scope.constraint,
            FindingKind::EvaluationError,
            Level::Error,
            scope.node,
            error.to_string(),
        );
    }

    fn handle_pass(&mut self, scope: ConstraintScope<'_>, target: &NodeRef) {
        let message = format!(
            "Constraint '{}' ({}) passed at path '{}'",
            scope.constraint.display_id(),
            scope.constraint.kind.name(),
            self.path(target)
        );
        self.result.push(Finding {
            kind: FindingKind::Pass,
            level: scope.constraint.level,
            constraint_id: scope.constraint.id.clone(),
            target_path: self.path(target),
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_model::Document;

    fn sample() -> Document {
        Document::builder()
            .root_assembly("catalog", |catalog| {
                catalog
                    .field("prop", DataType::Token, "alpha")
                    .field("prop", DataType::Token, "beta")
                    .field("prop", DataType::Token, "gamma");
            })
            .build()
    }

    fn props(doc: &Document) -> (NodeRef, Vec<NodeRef>) {
        let Some(catalog) = doc.root_assembly() else {
            panic!("Expected a root assembly");
        };
        let props = catalog.children_named("prop");
        (catalog, props)
    }

    #[test]
    fn test_cardinality_messages() {
        let doc = sample();
        let (catalog, props) = props(&doc);
        let ctx = DynamicContext::default();
        let constraint = Constraint::cardinality("prop", Some(4), Some(2)).unwrap();
        let scope = ConstraintScope {
            constraint: &constraint,
            node: &catalog,
            dynamic: &ctx,
        };
        let mut handler = FindingCollectingHandler::default();
        handler.handle_cardinality_minimum(scope, &props);
        handler.handle_cardinality_maximum(scope, &props);
        let result = handler.into_result();
        assert_eq!(
            result.findings[0].message,
            "The cardinality '3' is below the required minimum '4' for items matching 'prop'."
        );
        assert_eq!(
            result.findings[1].message,
            "The cardinality '3' is greater than the required maximum '2' at: \
             '/catalog[1]/prop[1]', '/catalog[1]/prop[2]', and '/catalog[1]/prop[3]'."
        );
        assert_eq!(result.findings[1].target_path, "/catalog[1]");
        assert!(!result.is_passing());
    }

    #[test]
    fn test_allowed_values_message_uses_most_severe_level() {
        let doc = sample();
        let (_, props) = props(&doc);
        let ctx = DynamicContext::default();
        let constraints = vec![
            Arc::new(
                Constraint::allowed_values(".", ["b", "a"], false)
                    .unwrap()
                    .with_level(Level::Warning),
            ),
            Arc::new(
                Constraint::allowed_values(".", ["c", "a"], false)
                    .unwrap()
                    .with_level(Level::Critical),
            ),
        ];
        let mut handler = FindingCollectingHandler::default();
        handler.handle_allowed_values(&constraints, &props[0], &ctx);
        let result = handler.into_result();
        let finding = &result.findings[0];
        assert_eq!(finding.level, Level::Critical);
        assert_eq!(
            finding.message,
            "Value 'alpha' doesn't match one of 'a, b, or c' at path '/catalog[1]/prop[1]'"
        );
        assert_eq!(result.highest_level, Level::Critical);
    }

    #[test]
    fn test_custom_message_template() {
        let doc = sample();
        let (catalog, props) = props(&doc);
        let ctx = DynamicContext::default();
        let constraint = Constraint::expect("prop", "string-length(.) < 5")
            .unwrap()
            .with_message("Property '{ . }' is too long")
            .unwrap();
        let scope = ConstraintScope {
            constraint: &constraint,
            node: &catalog,
            dynamic: &ctx,
        };
        let mut handler = FindingCollectingHandler::default();
        handler.handle_expect(scope, &props[2]);
        assert_eq!(handler.result().findings[0].message, "Property 'gamma' is too long");
    }

    #[test]
    fn test_findings_beyond_maximum_are_summarized() {
        let doc = sample();
        let (catalog, props) = props(&doc);
        let ctx = DynamicContext::default();
        let constraint = Constraint::matches_pattern("prop", "[a-z]{2}").unwrap().with_id("short");
        let Some(pattern) = (match &constraint.kind {
            ConstraintKind::Matches { pattern, .. } => pattern.clone(),
            _ => None,
        }) else {
            panic!("Expected a pattern");
        };
        let scope = ConstraintScope {
            constraint: &constraint,
            node: &catalog,
            dynamic: &ctx,
        };
        let config = ValidationConfig {
            max_findings_per_constraint: Some(1),
            ..ValidationConfig::default()
        };
        let mut handler = FindingCollectingHandler::new(&config);
        for prop in &props {
            handler.handle_match_pattern(scope, prop, &lexical_string(prop), &pattern);
        }
        let result = handler.into_result();
        assert_eq!(result.findings.len(), 2);
        assert_eq!(
            result.findings[0].message,
            "Value 'alpha' did not match the pattern '[a-z]{2}' at path '/catalog[1]/prop[1]'"
        );
        assert_eq!(
            result.findings[1].message,
            "2 additional findings for constraint 'short' were not reported"
        );
    }
}
