//! The compiled, executable expression tree.
//!
//! An [`Expr`] is produced by [`crate::compiler`] from the syntax tree. Names
//! are resolved, functions are bound to their library entries, multi-variable
//! `for`/`let` clauses are nested, arrow expressions are desugared into calls
//! and operands that need atomizing are wrapped in [`Expr::Atomize`]. Trees
//! are immutable and shared behind an `Arc` by [`crate::MetapathExpression`].
use std::sync::Arc;

use crate::ast::{Axis, NodeTest, Quantifier};
use crate::functions::Function;
use crate::types::{AtomicType, Occurrence, Sequence, SequenceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "div",
            ArithmeticOp::IntegerDivide => "idiv",
            ArithmeticOp::Modulo => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeComparisonOp {
    Is,
    Precedes,
    Follows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone)]
pub enum LookupKey {
    Wildcard,
    Name(String),
    Integer(i64),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub sequence_type: Option<SequenceType>,
}

/// The body and signature of an inline function expression.
#[derive(Debug)]
pub struct InlineFunctionDecl {
    pub params: Vec<Param>,
    pub return_type: Option<SequenceType>,
    pub body: Expr,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Sequence),
    ContextItem,
    Root,
    Variable(String),
    Sequence(Vec<Expr>),

    Step {
        axis: Axis,
        test: NodeTest,
        predicates: Vec<Expr>,
    },
    Path {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Filter {
        base: Box<Expr>,
        predicates: Vec<Expr>,
    },

    FunctionCall {
        function: Arc<Function>,
        args: Vec<Expr>,
    },
    /// A static call with `?` placeholders, producing a function item.
    PartialCall {
        function: Arc<Function>,
        args: Vec<Option<Expr>>,
    },
    DynamicCall {
        function: Box<Expr>,
        args: Vec<Option<Expr>>,
    },
    NamedFunctionRef {
        function: Arc<Function>,
        arity: usize,
    },
    InlineFunction(Arc<InlineFunctionDecl>),

    Arithmetic {
        left: Box<Expr>,
        op: ArithmeticOp,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    GeneralComparison {
        left: Box<Expr>,
        op: ComparisonOp,
        right: Box<Expr>,
    },
    ValueComparison {
        left: Box<Expr>,
        op: ComparisonOp,
        right: Box<Expr>,
    },
    NodeComparison {
        left: Box<Expr>,
        op: NodeComparisonOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    SetOp {
        left: Box<Expr>,
        op: SetOp,
        right: Box<Expr>,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },
    StringConcat(Vec<Expr>),
    SimpleMap {
        base: Box<Expr>,
        mapping: Box<Expr>,
    },

    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    For {
        name: String,
        source: Box<Expr>,
        body: Box<Expr>,
    },
    Quantified {
        quantifier: Quantifier,
        bindings: Vec<(String, Expr)>,
        satisfies: Box<Expr>,
    },
    If {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    Lookup {
        base: Box<Expr>,
        key: LookupKey,
    },
    UnaryLookup(LookupKey),
    MapConstructor(Vec<(Expr, Expr)>),
    SquareArray(Vec<Expr>),
    CurlyArray(Box<Expr>),

    InstanceOf {
        expr: Box<Expr>,
        sequence_type: SequenceType,
    },
    TreatAs {
        expr: Box<Expr>,
        sequence_type: SequenceType,
    },
    CastAs {
        expr: Box<Expr>,
        target: AtomicType,
        allow_empty: bool,
    },
    CastableAs {
        expr: Box<Expr>,
        target: AtomicType,
        allow_empty: bool,
    },
    Atomize(Box<Expr>),
}

impl Expr {
    /// Whether evaluating this expression reads the focus (context item,
    /// position or size). Sub-expressions evaluated under a focus of their
    /// own, such as the right side of a path, do not count.
    pub fn is_focus_dependent(&self) -> bool {
        match self {
            Expr::ContextItem | Expr::Root | Expr::Step { .. } | Expr::UnaryLookup(_) => true,
            Expr::Literal(_)
            | Expr::Variable(_)
            | Expr::NamedFunctionRef { .. }
            | Expr::InlineFunction(_) => false,
            Expr::Sequence(items) | Expr::SquareArray(items) | Expr::StringConcat(items) => {
                items.iter().any(Expr::is_focus_dependent)
            }
            Expr::Path { left, .. } => left.is_focus_dependent(),
            Expr::Filter { base, .. } => base.is_focus_dependent(),
            Expr::SimpleMap { base, .. } => base.is_focus_dependent(),
            Expr::FunctionCall { function, args } => {
                (function.properties.focus_dependent && args.len() < function.params.len())
                    || args.iter().any(Expr::is_focus_dependent)
            }
            Expr::PartialCall { args, .. } => args.iter().flatten().any(Expr::is_focus_dependent),
            Expr::DynamicCall { function, args } => {
                function.is_focus_dependent() || args.iter().flatten().any(Expr::is_focus_dependent)
            }
            Expr::Arithmetic { left, right, .. }
            | Expr::GeneralComparison { left, right, .. }
            | Expr::ValueComparison { left, right, .. }
            | Expr::NodeComparison { left, right, .. }
            | Expr::SetOp { left, right, .. }
            | Expr::And(left, right)
            | Expr::Or(left, right)
            | Expr::Range {
                start: left,
                end: right,
            } => left.is_focus_dependent() || right.is_focus_dependent(),
            Expr::Negate(e)
            | Expr::CurlyArray(e)
            | Expr::Atomize(e)
            | Expr::InstanceOf { expr: e, .. }
            | Expr::TreatAs { expr: e, .. }
            | Expr::CastAs { expr: e, .. }
            | Expr::CastableAs { expr: e, .. } => e.is_focus_dependent(),
            Expr::Let { value, body, .. } => {
                value.is_focus_dependent() || body.is_focus_dependent()
            }
            Expr::For { source, body, .. } => {
                source.is_focus_dependent() || body.is_focus_dependent()
            }
            Expr::Quantified {
                bindings,
                satisfies,
                ..
            } => {
                bindings.iter().any(|(_, e)| e.is_focus_dependent())
                    || satisfies.is_focus_dependent()
            }
            Expr::If {
                condition,
                then_expr,
                else_expr,
            } => {
                condition.is_focus_dependent()
                    || then_expr.is_focus_dependent()
                    || else_expr.is_focus_dependent()
            }
            Expr::Lookup { base, key } => {
                base.is_focus_dependent()
                    || matches!(key, LookupKey::Computed(e) if e.is_focus_dependent())
            }
            Expr::MapConstructor(entries) => entries
                .iter()
                .any(|(k, v)| k.is_focus_dependent() || v.is_focus_dependent()),
        }
    }

    /// The statically known cardinality of the result.
    pub fn cardinality(&self) -> Occurrence {
        match self {
            Expr::Literal(seq) => match seq.len() {
                0 => Occurrence::ZeroOrOne,
                1 => Occurrence::One,
                _ => Occurrence::OneOrMore,
            },
            Expr::GeneralComparison { .. }
            | Expr::NodeComparison { .. }
            | Expr::And(..)
            | Expr::Or(..)
            | Expr::Quantified { .. }
            | Expr::InstanceOf { .. }
            | Expr::CastableAs { .. }
            | Expr::StringConcat(_)
            | Expr::NamedFunctionRef { .. }
            | Expr::InlineFunction(_)
            | Expr::PartialCall { .. }
            | Expr::MapConstructor(_)
            | Expr::SquareArray(_)
            | Expr::CurlyArray(_) => Occurrence::One,
            Expr::Arithmetic { .. }
            | Expr::Negate(_)
            | Expr::ValueComparison { .. }
            | Expr::Root => Occurrence::ZeroOrOne,
            Expr::CastAs { allow_empty, .. } => {
                if *allow_empty {
                    Occurrence::ZeroOrOne
                } else {
                    Occurrence::One
                }
            }
            Expr::FunctionCall { function, .. } => match &function.result {
                SequenceType::Empty => Occurrence::ZeroOrOne,
                SequenceType::Of(_, occurrence) => *occurrence,
            },
            _ => Occurrence::ZeroOrMore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KindTest;

    #[test]
    fn test_focus_dependence() {
        let step = Expr::Step {
            axis: Axis::Child,
            test: NodeTest::Kind(KindTest::AnyKind),
            predicates: Vec::new(),
        };
        assert!(step.is_focus_dependent());

        let path = Expr::Path {
            left: Box::new(Expr::Variable("doc".into())),
            right: Box::new(step.clone()),
        };
        assert!(!path.is_focus_dependent());

        let literal = Expr::Literal(Sequence::from_integer(1));
        assert!(!literal.is_focus_dependent());
        assert_eq!(literal.cardinality(), Occurrence::One);
    }
}
