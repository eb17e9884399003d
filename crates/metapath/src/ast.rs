//! Metapath concrete syntax tree.
//!
//! Core types: [`Expression`], [`SequenceTypeDecl`], [`QName`]. The tree is a
//! faithful image of the query text; names are still unresolved and no
//! implicit operations have been inserted. See [`crate::compiler`] for the
//! semantic pass that turns it into an executable [`crate::expr::Expr`].

use std::fmt;

use rust_decimal::Decimal;

use crate::types::{KindTest, Occurrence};

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    ContextItem,
    /// A leading `/`: the root of the tree containing the context node.
    Root,
    Variable(QName),
    Sequence(Vec<Expression>),

    AxisStep(Step),
    /// `left/right`, with `right` evaluated once per item of `left`.
    Path {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Filter {
        base: Box<Expression>,
        predicates: Vec<Expression>,
    },

    FunctionCall {
        name: QName,
        args: Vec<Expression>,
    },
    DynamicFunctionCall {
        function_expr: Box<Expression>,
        args: Vec<Expression>,
    },
    ArgumentPlaceholder,
    NamedFunctionRef {
        name: QName,
        arity: usize,
    },
    InlineFunction {
        params: Vec<Param>,
        return_type: Option<SequenceTypeDecl>,
        body: Box<Expression>,
    },

    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },

    LetExpr {
        bindings: Vec<(QName, Box<Expression>)>,
        return_expr: Box<Expression>,
    },
    ForExpr {
        bindings: Vec<(QName, Box<Expression>)>,
        return_expr: Box<Expression>,
    },
    QuantifiedExpr {
        quantifier: Quantifier,
        bindings: Vec<(QName, Box<Expression>)>,
        satisfies: Box<Expression>,
    },
    IfExpr {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },

    RangeExpr {
        start: Box<Expression>,
        end: Box<Expression>,
    },
    StringConcat {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    SimpleMapExpr {
        base: Box<Expression>,
        mapping: Box<Expression>,
    },
    ArrowExpr {
        base: Box<Expression>,
        steps: Vec<ArrowStep>,
    },
    LookupExpr {
        base: Box<Expression>,
        key: LookupKey,
    },
    UnaryLookup(LookupKey),

    MapConstructor(Vec<MapEntry>),
    ArrayConstructor(ArrayConstructorKind),

    InstanceOf {
        expr: Box<Expression>,
        sequence_type: SequenceTypeDecl,
    },
    TreatAs {
        expr: Box<Expression>,
        sequence_type: SequenceTypeDecl,
    },
    CastAs {
        expr: Box<Expression>,
        single_type: SingleType,
    },
    CastableAs {
        expr: Box<Expression>,
        single_type: SingleType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
}

/// A lexical QName. `namespace` is only set for `Q{uri}local` names; prefixes
/// are resolved by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local_part: String,
    pub namespace: Option<String>,
}

impl QName {
    pub fn new(local_part: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local_part: local_part.into(),
            namespace: None,
        }
    }

    pub fn with_prefix(prefix: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            local_part: local_part.into(),
            namespace: None,
        }
    }

    pub fn with_namespace(namespace: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local_part: local_part.into(),
            namespace: Some(namespace.into()),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.namespace, &self.prefix) {
            (Some(ns), _) => write!(f, "Q{{{}}}{}", ns, self.local_part),
            (None, Some(p)) => write!(f, "{}:{}", p, self.local_part),
            (None, None) => f.write_str(&self.local_part),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // General comparison
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Value comparison
    ValueEq,
    ValueNe,
    ValueLt,
    ValueLe,
    ValueGt,
    ValueGe,
    // Node comparison
    Is,
    Precedes,
    Follows,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
    // Set
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Flag,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    /// Reverse axes number their positional predicates from the context
    /// node outwards.
    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            Axis::Parent
                | Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::PrecedingSibling
                | Axis::Preceding
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Flag => "flag",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::SelfAxis => "self",
            Axis::FollowingSibling => "following-sibling",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Following => "following",
            Axis::Preceding => "preceding",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// Matches the use-name of the node. Prefixes are ignored.
    Name(QName),
    Wildcard,
    Kind(KindTest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: Box<Expression>,
    pub value: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayConstructorKind {
    Square(Vec<Expression>),
    Curly(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: QName,
    pub type_decl: Option<SequenceTypeDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrowTarget {
    Named(QName),
    Variable(QName),
    Parenthesized(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrowStep {
    pub target: ArrowTarget,
    pub args: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupKey {
    Wildcard,
    NCName(String),
    Integer(i64),
    Parenthesized(Box<Expression>),
}

/// A sequence type as written. Atomic type names are resolved later.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceTypeDecl {
    Empty,
    Of(ItemTypeDecl, Occurrence),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemTypeDecl {
    AnyItem,
    Atomic(QName),
    Kind(KindTest),
    /// `function(*)`, or a typed function test with its parameter count.
    Function(Option<usize>),
    Map,
    Array,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleType {
    pub type_name: QName,
    pub optional: bool,
}

impl Expression {
    pub fn literal_string(s: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(s.into()))
    }

    pub fn literal_integer(i: i64) -> Self {
        Expression::Literal(Literal::Integer(i))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(QName::new(name))
    }

    pub fn binary_op(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn path(left: Expression, right: Expression) -> Self {
        Expression::Path {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn step(axis: Axis, node_test: NodeTest) -> Self {
        Expression::AxisStep(Step {
            axis,
            node_test,
            predicates: Vec::new(),
        })
    }

    /// `descendant-or-self::node()`, the expansion of `//`.
    pub fn descendant_or_self() -> Self {
        Expression::step(Axis::DescendantOrSelf, NodeTest::Kind(KindTest::AnyKind))
    }
}
