//! Sequence types as used by `instance of`, `treat as`, inline function
//! signatures and builtin function signatures.
use std::fmt;

use metaschema_model::{NodeKind, NodeRef};

use super::{AtomicType, Item, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn allows(&self, count: usize) -> bool {
        match self {
            Occurrence::One => count == 1,
            Occurrence::ZeroOrOne => count <= 1,
            Occurrence::ZeroOrMore => true,
            Occurrence::OneOrMore => count >= 1,
        }
    }

    pub fn indicator(&self) -> &'static str {
        match self {
            Occurrence::One => "",
            Occurrence::ZeroOrOne => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        }
    }
}

/// A node kind test, optionally restricted to a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindTest {
    AnyKind,
    Document,
    Assembly(Option<String>),
    Field(Option<String>),
    Flag(Option<String>),
}

impl KindTest {
    pub fn matches(&self, node: &NodeRef) -> bool {
        let (kind, name) = match self {
            KindTest::AnyKind => return true,
            KindTest::Document => return node.kind() == NodeKind::Document,
            KindTest::Assembly(name) => (NodeKind::Assembly, name),
            KindTest::Field(name) => (NodeKind::Field, name),
            KindTest::Flag(name) => (NodeKind::Flag, name),
        };
        node.kind() == kind && name.as_deref().is_none_or(|n| node.name() == Some(n))
    }
}

impl fmt::Display for KindTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (test, name) = match self {
            KindTest::AnyKind => return f.write_str("node()"),
            KindTest::Document => return f.write_str("document-node()"),
            KindTest::Assembly(name) => ("assembly", name),
            KindTest::Field(name) => ("field", name),
            KindTest::Flag(name) => ("flag", name),
        };
        write!(f, "{}({})", test, name.as_deref().unwrap_or(""))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemType {
    AnyItem,
    Atomic(AtomicType),
    Kind(KindTest),
    /// `function(*)`, or a function of a fixed arity.
    Function(Option<usize>),
    Map,
    Array,
}

impl ItemType {
    pub fn matches(&self, item: &Item) -> bool {
        match (self, item) {
            (ItemType::AnyItem, _) => true,
            (ItemType::Atomic(t), Item::Atomic(a)) => t.is_instance(a),
            (ItemType::Kind(test), Item::Node(n)) => test.matches(n),
            (ItemType::Function(None), i) => i.is_function(),
            (ItemType::Function(Some(arity)), Item::Function(f)) => f.arity() == *arity,
            (ItemType::Function(Some(arity)), Item::Map(_) | Item::Array(_)) => *arity == 1,
            (ItemType::Map, Item::Map(_)) => true,
            (ItemType::Array, Item::Array(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::AnyItem => f.write_str("item()"),
            ItemType::Atomic(t) => f.write_str(t.name()),
            ItemType::Kind(k) => k.fmt(f),
            ItemType::Function(None) => f.write_str("function(*)"),
            ItemType::Function(Some(n)) => write!(f, "function#{}", n),
            ItemType::Map => f.write_str("map(*)"),
            ItemType::Array => f.write_str("array(*)"),
        }
    }
}

/// An item type with an occurrence indicator, or `empty-sequence()`.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceType {
    Empty,
    Of(ItemType, Occurrence),
}

impl SequenceType {
    pub fn matches(&self, sequence: &Sequence) -> bool {
        match self {
            SequenceType::Empty => sequence.is_empty(),
            SequenceType::Of(item_type, occurrence) => {
                let mut count = 0;
                for item in sequence.iter() {
                    count += 1;
                    if !item_type.matches(&item) || (count > 1 && !occurrence.allows(count)) {
                        return false;
                    }
                }
                occurrence.allows(count)
            }
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceType::Empty => f.write_str("empty-sequence()"),
            SequenceType::Of(item, occurrence) => write!(f, "{}{}", item, occurrence.indicator()),
        }
    }
}
