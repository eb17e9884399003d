//! The validation pass.
//!
//! The validator walks a document in document order. At every node whose
//! definition declares constraints it evaluates each constraint's target
//! expression with that node as the context item and checks the selected
//! nodes. Allowed-values and index-has-key checks need the whole document and
//! run once the walk is done.
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use metaschema_metapath::types::atomize_node;
use metaschema_metapath::types::datatype::conforms;
use metaschema_metapath::{DynamicContext, Item, StaticContext};
use metaschema_model::{DataType, MetapathPathFormatter, NodeRef};

use crate::config::ValidationConfig;
use crate::constraint::{Constraint, ConstraintKind, ConstraintSet, KeyField, Pattern};
use crate::error::ConstraintError;
use crate::finding::ValidationResult;
use crate::handler::{ConstraintScope, FindingCollectingHandler, ValidationHandler};
use crate::index::{Index, is_all_none, to_key};

struct KeyReference {
    constraint: Arc<Constraint>,
    node: NodeRef,
    targets: Vec<NodeRef>,
}

pub struct ConstraintValidator<'c, H> {
    constraints: &'c ConstraintSet,
    handler: H,
    dynamic: DynamicContext,
    report_passing: bool,
    indexes: HashMap<String, Index>,
    key_references: Vec<KeyReference>,
    allowed_values: IndexMap<NodeRef, Vec<Arc<Constraint>>>,
}

/// Builds the dynamic context constraint expressions are evaluated with.
pub fn dynamic_context(config: &ValidationConfig) -> DynamicContext {
    let builder = DynamicContext::builder(Arc::new(StaticContext::default()))
        .recursion_limit(config.recursion_limit);
    match config.implicit_timezone {
        Some(offset) => builder.implicit_timezone(offset).build(),
        None => builder.build(),
    }
}

/// The value of a target as written in the document. Nodes without simple
/// content fall back to their atomized string.
pub(crate) fn lexical_value(node: &NodeRef) -> Result<String, ConstraintError> {
    if let Some(value) = node.value() {
        return Ok(value.lexical);
    }
    atomize_node(node)
        .map(|value| value.to_string_value())
        .map_err(|e| ConstraintError::metapath(".", e))
}

impl<'c, H: ValidationHandler> ConstraintValidator<'c, H> {
    pub fn new(constraints: &'c ConstraintSet, config: &ValidationConfig, handler: H) -> Self {
        Self {
            constraints,
            handler,
            dynamic: dynamic_context(config),
            report_passing: config.report_passing,
            indexes: HashMap::new(),
            key_references: Vec::new(),
            allowed_values: IndexMap::new(),
        }
    }

    /// Validates the tree rooted at `root` and hands back the handler with
    /// everything it was told.
    pub fn validate(mut self, root: &NodeRef) -> H {
        self.visit(root);
        for node in root.descendants() {
            self.visit(&node);
        }
        self.check_allowed_values();
        self.check_key_references();
        self.handler
    }

    fn visit(&mut self, node: &NodeRef) {
        self.apply_constraints(node);
        for flag in node.flags() {
            self.apply_constraints(&flag);
        }
    }

    fn apply_constraints(&mut self, node: &NodeRef) {
        let Some(definition) = node.definition_name() else {
            return;
        };
        let constraints: &'c ConstraintSet = self.constraints;
        for constraint in constraints.constraints_for(definition) {
            log::debug!(
                "Applying {} constraint '{}' at '{}'",
                constraint.kind.name(),
                constraint.display_id(),
                node.to_path(&MetapathPathFormatter)
            );
            self.apply(constraint, node);
        }
    }

    fn apply(&mut self, constraint: &Arc<Constraint>, node: &NodeRef) {
        let targets = constraint
            .target
            .evaluate(Some(Item::Node(node.clone())), &self.dynamic)
            .and_then(|result| result.nodes())
            .map_err(|e| ConstraintError::metapath(constraint.target.source(), e));
        let targets = match targets {
            Ok(targets) => targets,
            Err(e) => {
                self.report_error(constraint, node, &e);
                return;
            }
        };
        match &constraint.kind {
            ConstraintKind::Cardinality { min, max } => {
                self.check_cardinality(constraint, node, &targets, *min, *max)
            }
            ConstraintKind::AllowedValues { .. } => {
                for target in targets {
                    self.allowed_values
                        .entry(target)
                        .or_default()
                        .push(Arc::clone(constraint));
                }
            }
            ConstraintKind::Matches { pattern, datatype } => {
                for target in &targets {
                    self.check_matches(constraint, node, target, pattern.as_ref(), *datatype);
                }
            }
            ConstraintKind::Index { name, key_fields } => {
                self.build_index(constraint, node, &targets, name, key_fields)
            }
            ConstraintKind::Unique { key_fields } => {
                self.check_unique(constraint, node, &targets, key_fields)
            }
            ConstraintKind::IndexHasKey { .. } => self.key_references.push(KeyReference {
                constraint: Arc::clone(constraint),
                node: node.clone(),
                targets,
            }),
            ConstraintKind::Expect { test } => {
                for target in &targets {
                    let scope = ConstraintScope {
                        constraint,
                        node,
                        dynamic: &self.dynamic,
                    };
                    let focus = Some(Item::Node(target.clone()));
                    match test.evaluate_as_boolean(focus, &self.dynamic) {
                        Ok(true) => {
                            if self.report_passing {
                                self.handler.handle_pass(scope, target);
                            }
                        }
                        Ok(false) => self.handler.handle_expect(scope, target),
                        Err(e) => {
                            let error = ConstraintError::metapath(test.source(), e);
                            self.handler.handle_error(scope, &error);
                        }
                    }
                }
            }
        }
    }

    fn report_error(&mut self, constraint: &Constraint, node: &NodeRef, error: &ConstraintError) {
        let scope = ConstraintScope {
            constraint,
            node,
            dynamic: &self.dynamic,
        };
        self.handler.handle_error(scope, error);
    }

    fn report_pass(&mut self, constraint: &Constraint, node: &NodeRef, target: &NodeRef) {
        if self.report_passing {
            let scope = ConstraintScope {
                constraint,
                node,
                dynamic: &self.dynamic,
            };
            self.handler.handle_pass(scope, target);
        }
    }

    fn check_cardinality(
        &mut self,
        constraint: &Constraint,
        node: &NodeRef,
        targets: &[NodeRef],
        min: Option<usize>,
        max: Option<usize>,
    ) {
        let count = targets.len();
        let scope = ConstraintScope {
            constraint,
            node,
            dynamic: &self.dynamic,
        };
        if min.is_some_and(|min| count < min) {
            self.handler.handle_cardinality_minimum(scope, targets);
        } else if max.is_some_and(|max| count > max) {
            self.handler.handle_cardinality_maximum(scope, targets);
        } else if self.report_passing {
            self.handler.handle_pass(scope, node);
        }
    }

    fn check_matches(
        &mut self,
        constraint: &Constraint,
        node: &NodeRef,
        target: &NodeRef,
        pattern: Option<&Pattern>,
        datatype: Option<DataType>,
    ) {
        let value = match lexical_value(target) {
            Ok(value) => value,
            Err(e) => return self.report_error(constraint, node, &e),
        };
        let scope = ConstraintScope {
            constraint,
            node,
            dynamic: &self.dynamic,
        };
        let mut passed = true;
        if let Some(pattern) = pattern
            && !pattern.is_match(&value)
        {
            self.handler.handle_match_pattern(scope, target, &value, pattern);
            passed = false;
        }
        if let Some(datatype) = datatype
            && !conforms(datatype, &value)
        {
            self.handler.handle_match_datatype(scope, target, &value, datatype);
            passed = false;
        }
        if passed {
            self.report_pass(constraint, node, target);
        }
    }

    fn build_index(
        &mut self,
        constraint: &Constraint,
        node: &NodeRef,
        targets: &[NodeRef],
        name: &str,
        key_fields: &[KeyField],
    ) {
        if self.indexes.contains_key(name) {
            let scope = ConstraintScope {
                constraint,
                node,
                dynamic: &self.dynamic,
            };
            self.handler.handle_index_duplicate_name(scope);
            return;
        }
        let mut index = Index::new(key_fields.to_vec());
        for target in targets {
            let key = match to_key(target, key_fields, &self.dynamic) {
                Ok(key) => key,
                Err(e) => {
                    self.report_error(constraint, node, &e);
                    continue;
                }
            };
            if is_all_none(&key) {
                continue;
            }
            match index.put(target.clone(), key) {
                Some(old) => {
                    let scope = ConstraintScope {
                        constraint,
                        node,
                        dynamic: &self.dynamic,
                    };
                    self.handler.handle_index_duplicate_key(scope, &old, target);
                }
                None => self.report_pass(constraint, node, target),
            }
        }
        log::debug!("Built index '{}' with {} keys", name, index.len());
        self.indexes.insert(name.to_string(), index);
    }

    fn check_unique(
        &mut self,
        constraint: &Constraint,
        node: &NodeRef,
        targets: &[NodeRef],
        key_fields: &[KeyField],
    ) {
        let mut index = Index::new(key_fields.to_vec());
        for target in targets {
            let key = match to_key(target, key_fields, &self.dynamic) {
                Ok(key) => key,
                Err(e) => {
                    self.report_error(constraint, node, &e);
                    continue;
                }
            };
            if is_all_none(&key) {
                continue;
            }
            match index.put(target.clone(), key) {
                Some(old) => {
                    let scope = ConstraintScope {
                        constraint,
                        node,
                        dynamic: &self.dynamic,
                    };
                    self.handler.handle_unique_violation(scope, &old, target);
                }
                None => self.report_pass(constraint, node, target),
            }
        }
    }

    /// A value passes when any constraint targeting the node lists it, or
    /// when every one of them allows other values.
    fn check_allowed_values(&mut self) {
        for (target, constraints) in std::mem::take(&mut self.allowed_values) {
            let Some(first) = constraints.first() else {
                continue;
            };
            let value = match lexical_value(&target) {
                Ok(value) => value,
                Err(e) => {
                    self.report_error(first, &target, &e);
                    continue;
                }
            };
            let allowed = constraints.iter().any(|c| c.allows_value(&value))
                || constraints.iter().all(|c| c.allows_other_values());
            if allowed {
                self.report_pass(first, &target, &target);
            } else {
                self.handler
                    .handle_allowed_values(&constraints, &target, &self.dynamic);
            }
        }
    }

    fn check_key_references(&mut self) {
        for reference in std::mem::take(&mut self.key_references) {
            let constraint = reference.constraint.as_ref();
            let ConstraintKind::IndexHasKey {
                index_name,
                key_fields,
            } = &constraint.kind
            else {
                continue;
            };
            let scope = ConstraintScope {
                constraint,
                node: &reference.node,
                dynamic: &self.dynamic,
            };
            let Some(index) = self.indexes.get(index_name) else {
                let message = format!("Index '{}' is not defined", index_name);
                for target in &reference.targets {
                    self.handler.handle_missing_index(scope, target, &message);
                }
                continue;
            };
            for target in &reference.targets {
                let key = match to_key(target, key_fields, &self.dynamic) {
                    Ok(key) => key,
                    Err(e) => {
                        self.handler.handle_error(scope, &e);
                        continue;
                    }
                };
                if is_all_none(&key) {
                    continue;
                }
                if index.get(&key).is_none() {
                    self.handler.handle_index_miss(scope, target, &key);
                } else if self.report_passing {
                    self.handler.handle_pass(scope, target);
                }
            }
        }
    }
}

/// Validates the document rooted at `root` against `constraints`, collecting
/// every finding.
pub fn validate_document(
    root: &NodeRef,
    constraints: &ConstraintSet,
    config: &ValidationConfig,
) -> ValidationResult {
    let handler = FindingCollectingHandler::new(config);
    let result = ConstraintValidator::new(constraints, config, handler)
        .validate(root)
        .into_result();
    let name = root
        .resolved_base_uri()
        .unwrap_or_else(|| root.to_path(config.path_format.formatter()));
    if result.is_passing() {
        log::info!("The document '{}' is valid.", name);
    } else {
        log::info!("The document '{}' is invalid.", name);
    }
    result
}
