//! Metapath: the XPath 3.1 derived query language of Metaschema.
//!
//! Expressions are parsed into a syntax tree, compiled against a
//! [`StaticContext`] into an executable tree, and evaluated over any node tree
//! implementing [`metaschema_model::Node`].
//!
//! # Key Types
//!
//! - [`MetapathExpression`]: a compiled, cheaply clonable expression
//! - [`StaticContext`] / [`DynamicContext`]: compile-time and run-time state
//! - [`Sequence`] / [`Item`] / [`AtomicValue`]: the data model
//! - [`FunctionLibrary`]: the builtin functions the compiler resolves against
//!
//! # Example
//!
//! ```ignore
//! use metaschema_metapath::{DynamicContext, Item, MetapathExpression};
//!
//! let expr = MetapathExpression::compile("count(//control[@id])")?;
//! let result = expr.evaluate(Some(Item::Node(document.root())), &DynamicContext::default())?;
//! ```

pub mod ast;
pub mod axes;
pub mod compiler;
pub mod context;
pub mod engine;
pub mod error;
pub mod expr;
pub mod expression;
pub mod functions;
pub mod operators;
pub mod parser;
pub mod types;

pub use context::{
    DynamicContext, DynamicContextBuilder, Focus, StaticContext, StaticContextBuilder, Variables,
};
pub use error::{ErrorCode, MetapathError, codes};
pub use expression::MetapathExpression;
pub use functions::{Function, FunctionLibrary, default_library};
pub use parser::parse_expression;
pub use types::{
    AtomicType, AtomicValue, FunctionItem, Item, ItemType, Occurrence, QNameValue, Sequence,
    SequenceType, XdmArray, XdmMap,
};
