use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use metaschema_model::{MetapathPathFormatter, NodeKind, NodeRef};
use rust_decimal::Decimal;

use super::datatype::parse_typed_value;
use super::{AtomicValue, FunctionItem, XdmArray, XdmMap};
use crate::error::{MetapathError, codes};

#[derive(Debug, Clone)]
pub enum Item {
    Atomic(AtomicValue),
    Node(NodeRef),
    Function(FunctionItem),
    Map(XdmMap),
    Array(XdmArray),
}

impl Item {
    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, Item::Atomic(_))
    }

    /// Maps and arrays are functions too.
    pub fn is_function(&self) -> bool {
        matches!(self, Item::Function(_) | Item::Map(_) | Item::Array(_))
    }

    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Item::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Item::Atomic(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&XdmMap> {
        match self {
            Item::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&XdmArray> {
        match self {
            Item::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Item::Atomic(a) => a.type_name(),
            Item::Node(n) => match n.kind() {
                NodeKind::Document => "document-node()",
                NodeKind::Assembly => "assembly()",
                NodeKind::Field => "field()",
                NodeKind::Flag => "flag()",
            },
            Item::Function(_) => "function(*)",
            Item::Map(_) => "map(*)",
            Item::Array(_) => "array(*)",
        }
    }

    /// The string value as returned by `fn:string`.
    pub fn string_value(&self) -> Result<String, MetapathError> {
        match self {
            Item::Atomic(a) => Ok(a.to_string_value()),
            Item::Node(n) => Ok(node_string_value(n)),
            other => Err(MetapathError::type_error(
                codes::FOTY0014,
                format!("The string value of a {} is not defined", other.type_name()),
            )),
        }
    }

    /// Appends the atomized value of this item to `out`.
    pub fn atomize_into(&self, out: &mut Vec<AtomicValue>) -> Result<(), MetapathError> {
        match self {
            Item::Atomic(a) => out.push(a.clone()),
            Item::Node(n) => out.push(atomize_node(n)?),
            Item::Array(array) => {
                for member in array.members() {
                    for item in member.iter() {
                        item.atomize_into(out)?;
                    }
                }
            }
            Item::Map(_) | Item::Function(_) => {
                return Err(MetapathError::type_error(
                    codes::FOTY0013,
                    format!("Cannot atomize a {}", self.type_name()),
                ));
            }
        }
        Ok(())
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Item::Atomic(a), Item::Atomic(b)) => a == b,
            (Item::Node(a), Item::Node(b)) => a == b,
            (Item::Function(a), Item::Function(b)) => a == b,
            (Item::Map(a), Item::Map(b)) => a == b,
            (Item::Array(a), Item::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl From<AtomicValue> for Item {
    fn from(value: AtomicValue) -> Self {
        Item::Atomic(value)
    }
}

impl From<NodeRef> for Item {
    fn from(node: NodeRef) -> Self {
        Item::Node(node)
    }
}

/// The typed value of a field or flag. Values that do not conform to their
/// declared data type atomize as `xs:untypedAtomic`.
pub fn atomize_node(node: &NodeRef) -> Result<AtomicValue, MetapathError> {
    match node.value() {
        Some(value) => Ok(parse_typed_value(value.datatype, &value.lexical)
            .unwrap_or(AtomicValue::UntypedAtomic(value.lexical))),
        None => Err(MetapathError::no_typed_value(
            node.kind(),
            node.to_path(&MetapathPathFormatter),
        )),
    }
}

/// The lexical value of a field or flag; for documents and assemblies the
/// concatenated values of all descendant fields.
pub fn node_string_value(node: &NodeRef) -> String {
    if let Some(value) = node.value() {
        return value.lexical;
    }
    node.descendants()
        .filter_map(|d| d.value())
        .map(|v| v.lexical)
        .collect()
}

type LazyIter = Box<dyn Iterator<Item = Item> + Send>;

struct LazyState {
    source: Option<LazyIter>,
    buffer: Vec<Item>,
}

/// A memoizing item source. Items are pulled on demand and kept, so the
/// sequence can be iterated any number of times with identical results.
struct LazyItems {
    state: Mutex<LazyState>,
}

impl LazyItems {
    /// Pulls from the source until `index` is buffered, returning that item.
    fn get(&self, index: usize) -> Option<Item> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.buffer.len() <= index {
            let next = state.source.as_mut().and_then(Iterator::next);
            match next {
                Some(item) => state.buffer.push(item),
                None => {
                    state.source = None;
                    return None;
                }
            }
        }
        state.buffer.get(index).cloned()
    }

    fn materialize(&self) -> Arc<[Item]> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(source) = state.source.take() {
            state.buffer.extend(source);
        }
        Arc::from(state.buffer.as_slice())
    }
}

#[derive(Clone)]
enum Repr {
    Empty,
    One(Item),
    Many(Arc<[Item]>),
    Lazy(Arc<LazyItems>),
}

/// An ordered, immutable, flat sequence of items. Cloning never copies the
/// items.
#[derive(Clone)]
pub struct Sequence {
    repr: Repr,
}

impl Sequence {
    pub fn empty() -> Self {
        Self { repr: Repr::Empty }
    }

    pub fn from_item(item: Item) -> Self {
        Self {
            repr: Repr::One(item),
        }
    }

    pub fn from_items(mut items: Vec<Item>) -> Self {
        match items.len() {
            0 => Self::empty(),
            1 => items.pop().map_or_else(Self::empty, Self::from_item),
            _ => Self {
                repr: Repr::Many(Arc::from(items)),
            },
        }
    }

    /// A sequence whose items are produced on demand. `iter` is consumed at
    /// most once.
    pub fn lazy(iter: impl Iterator<Item = Item> + Send + 'static) -> Self {
        Self {
            repr: Repr::Lazy(Arc::new(LazyItems {
                state: Mutex::new(LazyState {
                    source: Some(Box::new(iter)),
                    buffer: Vec::new(),
                }),
            })),
        }
    }

    pub fn from_atomic(value: AtomicValue) -> Self {
        Self::from_item(Item::Atomic(value))
    }

    pub fn from_atomics(values: impl IntoIterator<Item = AtomicValue>) -> Self {
        values.into_iter().map(Item::Atomic).collect()
    }

    pub fn from_node(node: NodeRef) -> Self {
        Self::from_item(Item::Node(node))
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeRef>) -> Self {
        nodes.into_iter().map(Item::Node).collect()
    }

    pub fn from_bool(b: bool) -> Self {
        Self::from_atomic(AtomicValue::Boolean(b))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self::from_atomic(AtomicValue::String(s.into()))
    }

    pub fn from_integer(i: i64) -> Self {
        Self::from_atomic(AtomicValue::Integer(i))
    }

    pub fn from_decimal(d: Decimal) -> Self {
        Self::from_atomic(AtomicValue::Decimal(d))
    }

    pub fn from_double(d: f64) -> Self {
        Self::from_atomic(AtomicValue::Double(d))
    }

    pub fn from_optional(item: Option<Item>) -> Self {
        item.map_or_else(Self::empty, Self::from_item)
    }

    /// The item at `index` (0-based). Lazy sequences are only advanced as far
    /// as needed.
    pub fn get(&self, index: usize) -> Option<Item> {
        match &self.repr {
            Repr::Empty => None,
            Repr::One(item) => (index == 0).then(|| item.clone()),
            Repr::Many(items) => items.get(index).cloned(),
            Repr::Lazy(lazy) => lazy.get(index),
        }
    }

    pub fn first(&self) -> Option<Item> {
        self.get(0)
    }

    pub fn is_empty(&self) -> bool {
        match &self.repr {
            Repr::Empty => true,
            Repr::One(_) | Repr::Many(_) => false,
            Repr::Lazy(lazy) => lazy.get(0).is_none(),
        }
    }

    /// `true` when the sequence holds exactly one item. Does not materialize
    /// a lazy sequence beyond its second item.
    pub fn is_singleton(&self) -> bool {
        self.get(0).is_some() && self.get(1).is_none()
    }

    /// Number of items. Forces a lazy sequence.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Empty => 0,
            Repr::One(_) => 1,
            Repr::Many(items) => items.len(),
            Repr::Lazy(lazy) => lazy.materialize().len(),
        }
    }

    /// The first item, or `None` for the empty sequence. With
    /// `fail_if_multiple`, a sequence of more than one item is a cardinality
    /// error.
    pub fn get_first(&self, fail_if_multiple: bool) -> Result<Option<Item>, MetapathError> {
        if fail_if_multiple && self.get(1).is_some() {
            return Err(MetapathError::cardinality(
                codes::XPTY0004,
                "A sequence of more than one item is not allowed here",
            ));
        }
        Ok(self.first())
    }

    pub fn iter(&self) -> SequenceIter {
        SequenceIter {
            sequence: self.clone(),
            index: 0,
        }
    }

    /// All items as a shared slice. Forces a lazy sequence.
    pub fn items(&self) -> Arc<[Item]> {
        match &self.repr {
            Repr::Empty => Arc::from(Vec::new()),
            Repr::One(item) => Arc::from(vec![item.clone()]),
            Repr::Many(items) => Arc::clone(items),
            Repr::Lazy(lazy) => lazy.materialize(),
        }
    }

    pub fn to_vec(&self) -> Vec<Item> {
        self.items().to_vec()
    }

    /// Concatenates sequences; the result is flat.
    pub fn concat(sequences: impl IntoIterator<Item = Sequence>) -> Self {
        let mut items = Vec::new();
        for sequence in sequences {
            items.extend(sequence.iter());
        }
        Self::from_items(items)
    }

    /// The effective boolean value per XPath 2.4.3.
    pub fn effective_boolean_value(&self) -> Result<bool, MetapathError> {
        let Some(first) = self.first() else {
            return Ok(false);
        };
        if first.is_node() {
            return Ok(true);
        }
        if self.get(1).is_some() {
            return Err(MetapathError::type_error(
                codes::FORG0006,
                "Effective boolean value is not defined for a sequence of two or more items starting with an atomic value",
            ));
        }
        match first {
            Item::Atomic(a) => a.effective_boolean_value(),
            other => Err(MetapathError::type_error(
                codes::FORG0006,
                format!("Effective boolean value is not defined for {}", other.type_name()),
            )),
        }
    }

    /// Atomizes every item, flattening arrays.
    pub fn atomize(&self) -> Result<Vec<AtomicValue>, MetapathError> {
        let mut out = Vec::new();
        for item in self.iter() {
            item.atomize_into(&mut out)?;
        }
        Ok(out)
    }

    /// Atomizes the sequence into zero or one value, failing on more.
    pub fn atomize_optional(&self) -> Result<Option<AtomicValue>, MetapathError> {
        let mut values = self.atomize()?;
        match values.len() {
            0 => Ok(None),
            1 => Ok(values.pop()),
            n => Err(MetapathError::cardinality(
                codes::XPTY0004,
                format!("Expected at most one atomic value, found {}", n),
            )),
        }
    }

    /// The nodes in the sequence; any other item is a type error.
    pub fn nodes(&self) -> Result<Vec<NodeRef>, MetapathError> {
        self.iter()
            .map(|item| match item {
                Item::Node(n) => Ok(n),
                other => Err(MetapathError::type_error(
                    codes::XPTY0004,
                    format!("Expected a node, found {}", other.type_name()),
                )),
            })
            .collect()
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<Item> for Sequence {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        Self::from_items(iter.into_iter().collect())
    }
}

impl From<Item> for Sequence {
    fn from(item: Item) -> Self {
        Self::from_item(item)
    }
}

impl From<AtomicValue> for Sequence {
    fn from(value: AtomicValue) -> Self {
        Self::from_atomic(value)
    }
}

impl From<bool> for Sequence {
    fn from(b: bool) -> Self {
        Self::from_bool(b)
    }
}

impl From<i64> for Sequence {
    fn from(i: i64) -> Self {
        Self::from_integer(i)
    }
}

impl From<&str> for Sequence {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.items() == other.items()
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items().iter()).finish()
    }
}

pub struct SequenceIter {
    sequence: Sequence,
    index: usize,
}

impl Iterator for SequenceIter {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        let item = self.sequence.get(self.index)?;
        self.index += 1;
        Some(item)
    }
}

impl IntoIterator for &Sequence {
    type Item = Item;
    type IntoIter = SequenceIter;

    fn into_iter(self) -> SequenceIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use metaschema_model::{DataType, Document};

    use super::*;

    #[test]
    fn test_empty_sequence() {
        let s = Sequence::empty();
        assert!(s.is_empty());
        assert_eq!(s.len(), 0);
        assert!(!s.effective_boolean_value().unwrap());
        assert_eq!(s.get_first(true).unwrap(), None);
    }

    #[test]
    fn test_get_first_cardinality() {
        let s = Sequence::from_atomics([AtomicValue::Integer(1), AtomicValue::Integer(2)]);
        assert_eq!(s.get_first(false).unwrap(), Some(Item::Atomic(AtomicValue::Integer(1))));
        assert_eq!(s.get_first(true).unwrap_err().code(), codes::XPTY0004);
    }

    #[test]
    fn test_lazy_sequence_is_pulled_on_demand() {
        static PULLED: AtomicUsize = AtomicUsize::new(0);
        let s = Sequence::lazy((1..=1_000).map(|i| {
            PULLED.fetch_add(1, Ordering::SeqCst);
            Item::Atomic(AtomicValue::Integer(i))
        }));
        assert!(!s.is_empty());
        assert!(s.effective_boolean_value().is_err());
        assert_eq!(PULLED.load(Ordering::SeqCst), 2);

        let copy = s.clone();
        assert_eq!(copy.len(), 1_000);
        assert_eq!(s.iter().count(), 1_000);
        assert_eq!(PULLED.load(Ordering::SeqCst), 1_000);
    }

    #[test]
    fn test_effective_boolean_value() {
        assert!(Sequence::from_bool(true).effective_boolean_value().unwrap());
        assert!(!Sequence::from_string("").effective_boolean_value().unwrap());
        assert!(!Sequence::from_integer(0).effective_boolean_value().unwrap());
        let two = Sequence::from_atomics([AtomicValue::Integer(1), AtomicValue::Integer(2)]);
        assert_eq!(two.effective_boolean_value().unwrap_err().code(), codes::FORG0006);
    }

    #[test]
    fn test_node_atomization() {
        let doc = Document::builder()
            .root_assembly("catalog", |c| {
                c.flag("count", DataType::Integer, "3")
                    .flag("broken", DataType::Integer, "three")
                    .field("title", DataType::String, "T");
            })
            .build();
        let catalog = doc.root_assembly().unwrap();
        assert_eq!(
            atomize_node(&catalog.flag("count").unwrap()).unwrap(),
            AtomicValue::Integer(3)
        );
        assert_eq!(
            atomize_node(&catalog.flag("broken").unwrap()).unwrap(),
            AtomicValue::UntypedAtomic("three".into())
        );
        let err = atomize_node(&catalog).unwrap_err();
        assert_eq!(err.code(), codes::FOTY0012);
        assert!(err.to_string().contains("/catalog[1]"));
        assert_eq!(node_string_value(&catalog), "T");
    }
}
