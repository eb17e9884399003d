//! Constraint validation of Metaschema documents.
//!
//! Constraints select nodes with Metapath expressions and check them for
//! cardinality, uniqueness, index membership, allowed values, patterns, data
//! types and arbitrary boolean tests. Violations are reported to a
//! [`ValidationHandler`] so that one pass collects every finding.
//!
//! # Key Types
//!
//! - [`Constraint`] / [`ConstraintSet`]: compiled constraint declarations
//! - [`Index`]: key-to-node map behind index and unique constraints
//! - [`ConstraintValidator`]: the document walk
//! - [`FindingCollectingHandler`] / [`ValidationResult`]: collected findings
//!
//! # Example
//!
//! ```ignore
//! use metaschema_constraint::{Constraint, ConstraintSet, ValidationConfig, validate_document};
//!
//! let constraints = ConstraintSet::new()
//!     .with("catalog", Constraint::cardinality("group", Some(1), None)?);
//! let result = validate_document(&document.root(), &constraints, &ValidationConfig::default());
//! println!("{}", result.to_json(true)?);
//! ```

pub mod config;
pub mod constraint;
pub mod error;
pub mod finding;
pub mod handler;
pub mod index;
pub mod level;
pub mod message;
pub mod validator;

pub use config::{PathFormat, ValidationConfig};
pub use constraint::{AllowedValue, Constraint, ConstraintKind, ConstraintSet, KeyField, Pattern};
pub use error::ConstraintError;
pub use finding::{Finding, FindingKind, ValidationResult};
pub use handler::{ConstraintScope, FindingCollectingHandler, ValidationHandler};
pub use index::{Index, Key};
pub use level::Level;
pub use message::MessageTemplate;
pub use validator::{ConstraintValidator, validate_document};
