use std::fmt;
use std::sync::Arc;

use super::{Item, QNameValue, Sequence};
use crate::context::Variables;
use crate::expr::InlineFunctionDecl;
use crate::functions::Function;

/// A function value: a named builtin, an inline function closed over the
/// variables in scope where it was created, or a partial application.
#[derive(Clone)]
pub enum FunctionItem {
    Builtin {
        function: Arc<Function>,
        arity: usize,
    },
    Inline {
        decl: Arc<InlineFunctionDecl>,
        captured: Variables,
    },
    /// `base` is a function, map or array item; `None` marks a placeholder.
    Partial {
        base: Box<Item>,
        bound: Vec<Option<Sequence>>,
    },
}

impl FunctionItem {
    pub fn arity(&self) -> usize {
        match self {
            FunctionItem::Builtin { arity, .. } => *arity,
            FunctionItem::Inline { decl, .. } => decl.params.len(),
            FunctionItem::Partial { bound, .. } => bound.iter().filter(|b| b.is_none()).count(),
        }
    }

    /// The function name; anonymous functions and partial applications
    /// have none.
    pub fn name(&self) -> Option<QNameValue> {
        match self {
            FunctionItem::Builtin { function, .. } => Some(function.qname()),
            FunctionItem::Inline { .. } | FunctionItem::Partial { .. } => None,
        }
    }
}

impl fmt::Debug for FunctionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionItem::Builtin { function, arity } => {
                write!(f, "function {}#{}", function.name, arity)
            }
            FunctionItem::Inline { decl, .. } => {
                let params: Vec<String> =
                    decl.params.iter().map(|p| format!("${}", p.name)).collect();
                write!(f, "function({})", params.join(", "))
            }
            FunctionItem::Partial { base, bound } => {
                write!(f, "partial {:?} with {} bound", base, bound.iter().flatten().count())
            }
        }
    }
}

impl PartialEq for FunctionItem {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                FunctionItem::Builtin { function: a, arity: x },
                FunctionItem::Builtin { function: b, arity: y },
            ) => Arc::ptr_eq(a, b) && x == y,
            (FunctionItem::Inline { decl: a, .. }, FunctionItem::Inline { decl: b, .. }) => {
                Arc::ptr_eq(a, b)
            }
            _ => false,
        }
    }
}
