//! Read-only node tree model shared by the Metapath engine and the constraint validator.
//!
//! A Metaschema document is a tree of assemblies, fields and flags that can be
//! materialized from XML, JSON or YAML. The evaluation and validation crates are
//! written exclusively against the [`Node`] trait, so any binding layer can plug
//! its own tree in.
//!
//! # Key Types
//!
//! - [`Node`]: the navigation contract every tree node implements
//! - [`NodeRef`]: a shared, identity-comparable handle to a node
//! - [`PathFormatter`]: renders node locations for reports
//! - [`Document`]: an in-memory arena tree built with [`DocumentBuilder`]

pub mod datatype;
pub mod document;
pub mod node;
pub mod path;

pub use datatype::DataType;
pub use document::{AssemblyBuilder, Document, DocumentBuilder, FieldBuilder};
pub use node::{Node, NodeIdentity, NodeKind, NodeRef, NodeValue};
pub use path::{MetapathPathFormatter, NamePathFormatter, PathFormatter};
