//! Metaschema: Metapath queries and constraint validation over
//! format-agnostic document trees.
//!
//! This crate re-exports the three member crates and adds a few one-call
//! entry points:
//!
//! - [`model`]: the node tree read interface and an in-memory document
//! - [`metapath`]: the Metapath compiler, type system and evaluator
//! - [`constraint`]: index-backed constraint validation
//!
//! # Example
//!
//! ```ignore
//! use metaschema::{Constraint, ConstraintSet, ValidationConfig};
//!
//! let titles = metaschema::query("//control/title", &document)?;
//! let constraints = ConstraintSet::new()
//!     .with("control", Constraint::matches_pattern("@id", "[a-z]{2}-\\d+")?);
//! let result = metaschema::validate(&document, &constraints, &ValidationConfig::default());
//! assert!(result.is_passing());
//! ```

pub mod error;

pub use metaschema_constraint as constraint;
pub use metaschema_metapath as metapath;
pub use metaschema_model as model;

pub use error::MetaschemaError;
pub use metaschema_constraint::{
    Constraint, ConstraintSet, Finding, FindingKind, KeyField, Level, ValidationConfig,
    ValidationResult,
};
pub use metaschema_metapath::{DynamicContext, Item, MetapathExpression, Sequence, StaticContext};
pub use metaschema_model::{DataType, Document, NodeRef};

/// Compiles `expression` and evaluates it with the document node of
/// `document` as the context item.
pub fn query(expression: &str, document: &Document) -> Result<Sequence, MetaschemaError> {
    let compiled = MetapathExpression::compile(expression)?;
    let result = compiled.evaluate(Some(Item::Node(document.root())), &DynamicContext::default())?;
    log::debug!("'{}' selected {} items", expression, result.len());
    Ok(result)
}

/// Validates `document` against `constraints`.
pub fn validate(
    document: &Document,
    constraints: &ConstraintSet,
    config: &ValidationConfig,
) -> ValidationResult {
    metaschema_constraint::validate_document(&document.root(), constraints, config)
}

/// Validates `document` and renders the findings as a JSON report, indented
/// when the config asks for it.
pub fn validation_report(
    document: &Document,
    constraints: &ConstraintSet,
    config: &ValidationConfig,
) -> Result<String, MetaschemaError> {
    let result = validate(document, constraints, config);
    Ok(result.to_json(config.pretty_json)?)
}
