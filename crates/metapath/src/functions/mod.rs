//! The builtin function library.
//!
//! Every builtin is a [`Function`]: a namespaced name, a parameter list with
//! declared sequence types, a result type, and a plain `fn` implementation that
//! receives the already converted argument sequences. Functions are collected
//! in an immutable [`FunctionLibrary`] that the compiler resolves call sites
//! against; [`default_library`] is built once per process and shared.
mod array;
mod boolean;
mod constructors;
mod core;
mod datetime;
pub mod hof;
mod map;
mod math;
mod node;
mod numeric;
mod regex;
mod sequence;
mod string;
mod uri;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use metaschema_model::NodeRef;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;

use crate::context::{DynamicContext, Focus};
use crate::error::{MetapathError, codes};
use crate::types::{
    AtomicType, AtomicValue, Item, ItemType, KindTest, Occurrence, QNameValue, Sequence,
    SequenceType, cast,
};

pub const FN: &str = "http://www.w3.org/2005/xpath-functions";
pub const MAP: &str = "http://www.w3.org/2005/xpath-functions/map";
pub const ARRAY: &str = "http://www.w3.org/2005/xpath-functions/array";
pub const MATH: &str = "http://www.w3.org/2005/xpath-functions/math";
pub const XS: &str = "http://www.w3.org/2001/XMLSchema";
pub const MP: &str = "http://csrc.nist.gov/ns/metaschema/metapath-functions";

/// The dynamic state visible to a builtin while it runs.
pub struct CallContext<'a> {
    pub dynamic: &'a DynamicContext,
    pub focus: &'a Focus,
}

impl<'a> CallContext<'a> {
    pub fn new(dynamic: &'a DynamicContext, focus: &'a Focus) -> Self {
        Self { dynamic, focus }
    }

    pub fn context_item(&self) -> Result<Item, MetapathError> {
        self.focus.context_item()
    }

    /// The context item, which must be a node.
    pub fn context_node(&self) -> Result<NodeRef, MetapathError> {
        match self.context_item()? {
            Item::Node(node) => Ok(node),
            other => Err(MetapathError::type_error(
                codes::XPTY0004,
                format!("The context item is a {}, not a node", other.type_name()),
            )),
        }
    }
}

pub type Implementation = fn(&[Sequence], &CallContext<'_>) -> Result<Sequence, MetapathError>;

/// How a function depends on its environment. The compiler only folds calls
/// to deterministic functions that depend on neither the dynamic context nor
/// the focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Properties {
    pub deterministic: bool,
    pub context_dependent: bool,
    pub focus_dependent: bool,
}

impl Properties {
    pub const PURE: Properties = Properties {
        deterministic: true,
        context_dependent: false,
        focus_dependent: false,
    };
    /// Reads the focus when called without arguments.
    pub const FOCUS: Properties = Properties {
        deterministic: true,
        context_dependent: false,
        focus_dependent: true,
    };
    /// Reads the dynamic context: timezone, current time, static base URI.
    pub const CONTEXT: Properties = Properties {
        deterministic: true,
        context_dependent: true,
        focus_dependent: false,
    };
    /// Side effects or caller-visible behavior beyond the result.
    pub const EFFECTFUL: Properties = Properties {
        deterministic: false,
        context_dependent: true,
        focus_dependent: false,
    };

    pub fn is_foldable(&self) -> bool {
        *self == Properties::PURE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: &'static str,
    pub sequence_type: SequenceType,
}

pub struct Function {
    pub namespace: &'static str,
    pub name: &'static str,
    pub params: Vec<Parameter>,
    /// Number of leading parameters a call must supply.
    pub required: usize,
    /// The last parameter repeats without limit (`fn:concat`).
    pub variadic: bool,
    pub result: SequenceType,
    pub properties: Properties,
    implementation: Implementation,
}

impl Function {
    pub fn new(
        namespace: &'static str,
        name: &'static str,
        implementation: Implementation,
    ) -> Self {
        Self {
            namespace,
            name,
            params: Vec::new(),
            required: 0,
            variadic: false,
            result: any_items(),
            properties: Properties::PURE,
            implementation,
        }
    }

    /// Appends a required parameter.
    pub fn param(mut self, name: &'static str, sequence_type: SequenceType) -> Self {
        self.params.push(Parameter {
            name,
            sequence_type,
        });
        self.required = self.params.len();
        self
    }

    /// Appends a parameter that may be omitted, producing a lower arity.
    pub fn optional(mut self, name: &'static str, sequence_type: SequenceType) -> Self {
        self.params.push(Parameter {
            name,
            sequence_type,
        });
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn returns(mut self, sequence_type: SequenceType) -> Self {
        self.result = sequence_type;
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn qname(&self) -> QNameValue {
        QNameValue::with_namespace(self.namespace, self.name)
    }

    pub fn accepts(&self, arity: usize) -> bool {
        arity >= self.required && (self.variadic || arity <= self.params.len())
    }

    /// The declared type of argument `index`, repeating the last one for
    /// variadic functions.
    pub fn parameter_type(&self, index: usize) -> Option<&SequenceType> {
        match self.params.get(index) {
            Some(p) => Some(&p.sequence_type),
            None if self.variadic => self.params.last().map(|p| &p.sequence_type),
            None => None,
        }
    }

    /// Applies the function conversion rules to `args` and runs the function.
    pub fn invoke(
        &self,
        args: Vec<Sequence>,
        ctx: &CallContext<'_>,
    ) -> Result<Sequence, MetapathError> {
        if !self.accepts(args.len()) {
            return Err(MetapathError::type_error(
                codes::XPTY0004,
                format!("Function {} does not accept {} arguments", self, args.len()),
            ));
        }
        let mut converted = Vec::with_capacity(args.len());
        for (index, arg) in args.into_iter().enumerate() {
            let value = match self.parameter_type(index) {
                Some(expected) => coerce(arg, expected, || {
                    format!("Argument {} of {}", index + 1, self)
                })?,
                None => arg,
            };
            converted.push(value);
        }
        (self.implementation)(&converted, ctx)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.namespace {
            FN => "fn",
            MAP => "map",
            ARRAY => "array",
            MATH => "math",
            XS => "xs",
            MP => "mp",
            other => return write!(f, "Q{{{}}}{}", other, self.name),
        };
        write!(f, "{}:{}", prefix, self.name)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.to_string())
            .field("params", &self.params.len())
            .field("required", &self.required)
            .field("variadic", &self.variadic)
            .finish()
    }
}

/// An immutable-after-construction registry of functions, keyed by expanded
/// name. A name may carry several entries with disjoint arities.
#[derive(Debug, Default)]
pub struct FunctionLibrary {
    functions: IndexMap<String, Vec<Arc<Function>>>,
}

impl FunctionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh library holding every builtin.
    pub fn standard() -> Self {
        let mut library = Self::new();
        boolean::register(&mut library);
        string::register(&mut library);
        regex::register(&mut library);
        numeric::register(&mut library);
        sequence::register(&mut library);
        node::register(&mut library);
        core::register(&mut library);
        datetime::register(&mut library);
        uri::register(&mut library);
        hof::register(&mut library);
        map::register(&mut library);
        array::register(&mut library);
        math::register(&mut library);
        constructors::register(&mut library);
        library
    }

    pub fn register(&mut self, function: Function) -> &mut Self {
        self.functions
            .entry(expanded_name(function.namespace, function.name))
            .or_default()
            .push(Arc::new(function));
        self
    }

    pub fn lookup(&self, namespace: &str, name: &str, arity: usize) -> Option<&Arc<Function>> {
        self.functions
            .get(&expanded_name(namespace, name))?
            .iter()
            .find(|f| f.accepts(arity))
    }

    /// Whether any arity of the function is registered.
    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.functions.contains_key(&expanded_name(namespace, name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Function>> {
        self.functions.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.functions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

fn expanded_name(namespace: &str, name: &str) -> String {
    format!("Q{{{}}}{}", namespace, name)
}

static DEFAULT_LIBRARY: Lazy<Arc<FunctionLibrary>> =
    Lazy::new(|| Arc::new(FunctionLibrary::standard()));

/// The shared standard library.
pub fn default_library() -> Arc<FunctionLibrary> {
    Arc::clone(&DEFAULT_LIBRARY)
}

/// Converts `sequence` to `expected` using the function conversion rules:
/// atomization, casting of untyped values, numeric promotion and `anyURI` to
/// string promotion. `role` names the value in error messages.
pub fn coerce(
    sequence: Sequence,
    expected: &SequenceType,
    role: impl Fn() -> String,
) -> Result<Sequence, MetapathError> {
    let mismatch = |found: String| {
        MetapathError::type_error(
            codes::XPTY0004,
            format!("{}: expected {}, found {}", role(), expected, found),
        )
    };
    let (item_type, occurrence) = match expected {
        SequenceType::Empty if sequence.is_empty() => return Ok(sequence),
        SequenceType::Empty => return Err(mismatch(describe(&sequence))),
        SequenceType::Of(item_type, occurrence) => (item_type, *occurrence),
    };

    match item_type {
        ItemType::AnyItem if occurrence == Occurrence::ZeroOrMore => Ok(sequence),
        ItemType::Atomic(target) => {
            let values = sequence.atomize()?;
            if !occurrence.allows(values.len()) {
                return Err(mismatch(format!("{} atomic values", values.len())));
            }
            let mut items = Vec::with_capacity(values.len());
            for value in values {
                let found = value.type_name();
                match convert_atomic(value, *target)? {
                    Some(v) => items.push(Item::Atomic(v)),
                    None => return Err(mismatch(found.to_string())),
                }
            }
            Ok(Sequence::from_items(items))
        }
        _ => {
            let mut count = 0;
            for item in sequence.iter() {
                count += 1;
                if !item_type.matches(&item) {
                    return Err(mismatch(item.type_name().to_string()));
                }
            }
            if !occurrence.allows(count) {
                return Err(mismatch(describe(&sequence)));
            }
            Ok(sequence)
        }
    }
}

fn convert_atomic(
    value: AtomicValue,
    target: AtomicType,
) -> Result<Option<AtomicValue>, MetapathError> {
    if target.is_instance(&value) {
        return Ok(Some(value));
    }
    let converted = match (&value, target) {
        (AtomicValue::UntypedAtomic(_), AtomicType::Numeric) => {
            Some(cast::cast(&value, AtomicType::Double)?)
        }
        (AtomicValue::UntypedAtomic(_), t) => Some(cast::cast(&value, t)?),
        (AtomicValue::Integer(_) | AtomicValue::Decimal(_), AtomicType::Double) => {
            value.to_double().map(AtomicValue::Double)
        }
        (AtomicValue::AnyUri(s), AtomicType::String) => Some(AtomicValue::String(s.clone())),
        _ => None,
    };
    Ok(converted)
}

fn describe(sequence: &Sequence) -> String {
    match sequence.len() {
        0 => "an empty sequence".to_string(),
        1 => sequence
            .first()
            .map_or_else(String::new, |i| i.type_name().to_string()),
        n => format!("a sequence of {} items", n),
    }
}

// Signature shorthands.

pub(crate) fn atomic(t: AtomicType, occurrence: Occurrence) -> SequenceType {
    SequenceType::Of(ItemType::Atomic(t), occurrence)
}

pub(crate) fn one(t: AtomicType) -> SequenceType {
    atomic(t, Occurrence::One)
}

pub(crate) fn opt(t: AtomicType) -> SequenceType {
    atomic(t, Occurrence::ZeroOrOne)
}

pub(crate) fn many(t: AtomicType) -> SequenceType {
    atomic(t, Occurrence::ZeroOrMore)
}

pub(crate) fn any_items() -> SequenceType {
    SequenceType::Of(ItemType::AnyItem, Occurrence::ZeroOrMore)
}

pub(crate) fn any_item() -> SequenceType {
    SequenceType::Of(ItemType::AnyItem, Occurrence::One)
}

pub(crate) fn opt_node() -> SequenceType {
    SequenceType::Of(ItemType::Kind(KindTest::AnyKind), Occurrence::ZeroOrOne)
}

pub(crate) fn nodes() -> SequenceType {
    SequenceType::Of(ItemType::Kind(KindTest::AnyKind), Occurrence::ZeroOrMore)
}

pub(crate) fn function_type(arity: Option<usize>) -> SequenceType {
    SequenceType::Of(ItemType::Function(arity), Occurrence::One)
}

pub(crate) fn map_type() -> SequenceType {
    SequenceType::Of(ItemType::Map, Occurrence::One)
}

pub(crate) fn array_type() -> SequenceType {
    SequenceType::Of(ItemType::Array, Occurrence::One)
}

// Argument accessors. Arguments have already been converted to their declared
// types, so these only unwrap.

pub(crate) fn opt_atomic(args: &[Sequence], index: usize) -> Option<AtomicValue> {
    args.get(index)?.first()?.as_atomic().cloned()
}

/// The string argument at `index`; the empty sequence reads as `""`.
pub(crate) fn string_arg(args: &[Sequence], index: usize) -> String {
    opt_atomic(args, index)
        .map(|a| a.to_string_value())
        .unwrap_or_default()
}

pub(crate) fn opt_string(args: &[Sequence], index: usize) -> Option<String> {
    opt_atomic(args, index).map(|a| a.to_string_value())
}

pub(crate) fn integer_arg(args: &[Sequence], index: usize) -> Option<i64> {
    match opt_atomic(args, index)? {
        AtomicValue::Integer(i) => Some(i),
        _ => None,
    }
}

pub(crate) fn double_arg(args: &[Sequence], index: usize) -> Option<f64> {
    opt_atomic(args, index)?.to_double()
}

pub(crate) fn bool_arg(args: &[Sequence], index: usize) -> bool {
    matches!(opt_atomic(args, index), Some(AtomicValue::Boolean(true)))
}

pub(crate) fn node_arg(args: &[Sequence], index: usize) -> Option<NodeRef> {
    args.get(index)?.first()?.as_node().cloned()
}

pub(crate) fn item_arg(args: &[Sequence], index: usize) -> Result<Item, MetapathError> {
    args.get(index).and_then(Sequence::first).ok_or_else(|| {
        MetapathError::cardinality(codes::XPTY0004, "A required argument is missing")
    })
}

pub(crate) fn arg(args: &[Sequence], index: usize) -> Sequence {
    args.get(index).cloned().unwrap_or_default()
}

/// The node argument at `index`, defaulting to the context node when the
/// argument was omitted.
pub(crate) fn node_or_context(
    args: &[Sequence],
    index: usize,
    ctx: &CallContext<'_>,
) -> Result<Option<NodeRef>, MetapathError> {
    if args.len() > index {
        Ok(node_arg(args, index))
    } else {
        ctx.context_node().map(Some)
    }
}

pub(crate) fn decimal_of(value: &AtomicValue) -> Option<Decimal> {
    match value {
        AtomicValue::Integer(i) => Some(Decimal::from(*i)),
        AtomicValue::Decimal(d) => Some(*d),
        _ => None,
    }
}
