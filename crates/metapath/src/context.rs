//! Static and dynamic evaluation context.
//!
//! The [`StaticContext`] is everything the compiler may consult: namespace
//! prefixes, the default function namespace and the function library. The
//! [`DynamicContext`] adds what only evaluation needs: variable bindings, the
//! implicit timezone and the current date-time. The [`Focus`] (context item,
//! position and size) travels separately so that expressions can shift it
//! without touching the rest of the context.
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, FixedOffset, Local};
use indexmap::IndexMap;

use crate::error::{MetapathError, codes};
use crate::functions::{self, FunctionLibrary};
use crate::types::{Item, Sequence};

pub const DEFAULT_RECURSION_LIMIT: usize = 256;

#[derive(Debug, Clone)]
pub struct StaticContext {
    /// Prefix to namespace URI bindings available to names in expressions.
    pub namespaces: IndexMap<String, String>,
    /// Namespace of unprefixed function names.
    pub default_function_namespace: String,
    /// Static base URI, returned by `fn:static-base-uri`.
    pub base_uri: Option<String>,
    pub library: Arc<FunctionLibrary>,
}

impl Default for StaticContext {
    fn default() -> Self {
        let namespaces = [
            ("fn", functions::FN),
            ("map", functions::MAP),
            ("array", functions::ARRAY),
            ("math", functions::MATH),
            ("xs", functions::XS),
            ("mp", functions::MP),
        ]
        .into_iter()
        .map(|(p, u)| (p.to_string(), u.to_string()))
        .collect();
        Self {
            namespaces,
            default_function_namespace: functions::FN.to_string(),
            base_uri: None,
            library: functions::default_library(),
        }
    }
}

impl StaticContext {
    pub fn builder() -> StaticContextBuilder {
        StaticContextBuilder {
            context: StaticContext::default(),
        }
    }

    pub fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }
}

pub struct StaticContextBuilder {
    context: StaticContext,
}

impl StaticContextBuilder {
    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.context.namespaces.insert(prefix.into(), uri.into());
        self
    }

    pub fn default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.context.default_function_namespace = uri.into();
        self
    }

    pub fn base_uri(mut self, uri: impl Into<String>) -> Self {
        self.context.base_uri = Some(uri.into());
        self
    }

    pub fn library(mut self, library: Arc<FunctionLibrary>) -> Self {
        self.context.library = library;
        self
    }

    pub fn build(self) -> StaticContext {
        self.context
    }
}

struct Binding {
    name: String,
    value: Sequence,
    next: Option<Arc<Binding>>,
}

/// A persistent variable environment. Binding returns a new environment that
/// shadows the receiver; the receiver itself never changes.
#[derive(Clone, Default)]
pub struct Variables {
    head: Option<Arc<Binding>>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, name: impl Into<String>, value: Sequence) -> Variables {
        Variables {
            head: Some(Arc::new(Binding {
                name: name.into(),
                value,
                next: self.head.clone(),
            })),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Sequence> {
        let mut current = self.head.as_deref();
        while let Some(binding) = current {
            if binding.name == name {
                return Some(&binding.value);
            }
            current = binding.next.as_deref();
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

impl fmt::Debug for Variables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        let mut current = self.head.as_deref();
        while let Some(binding) = current {
            names.push(binding.name.as_str());
            current = binding.next.as_deref();
        }
        f.debug_struct("Variables").field("names", &names).finish()
    }
}

#[derive(Debug, Clone)]
pub struct DynamicContext {
    static_context: Arc<StaticContext>,
    variables: Variables,
    implicit_timezone: FixedOffset,
    current_date_time: DateTime<FixedOffset>,
    recursion_limit: usize,
    depth: Arc<AtomicUsize>,
}

impl Default for DynamicContext {
    fn default() -> Self {
        Self::new(Arc::new(StaticContext::default()))
    }
}

impl DynamicContext {
    pub fn new(static_context: Arc<StaticContext>) -> Self {
        let now = Local::now().fixed_offset();
        Self {
            static_context,
            variables: Variables::new(),
            implicit_timezone: *now.offset(),
            current_date_time: now,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn builder(static_context: Arc<StaticContext>) -> DynamicContextBuilder {
        DynamicContextBuilder {
            context: DynamicContext::new(static_context),
        }
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.static_context
    }

    pub fn library(&self) -> &FunctionLibrary {
        &self.static_context.library
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Result<Sequence, MetapathError> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| MetapathError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    /// A child context with `name` bound. The receiver is unchanged.
    pub fn bind(&self, name: impl Into<String>, value: Sequence) -> DynamicContext {
        self.with_variables(self.variables.bind(name, value))
    }

    pub fn with_variables(&self, variables: Variables) -> DynamicContext {
        DynamicContext {
            variables,
            ..self.clone()
        }
    }

    pub fn implicit_timezone(&self) -> FixedOffset {
        self.implicit_timezone
    }

    /// Fixed for the lifetime of the context so repeated calls agree.
    pub fn current_date_time(&self) -> DateTime<FixedOffset> {
        self.current_date_time
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// Registers one nested dynamic function invocation, failing once the
    /// recursion limit is reached. The returned guard releases the slot.
    pub fn enter_call(&self) -> Result<CallGuard, MetapathError> {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = CallGuard {
            depth: Arc::clone(&self.depth),
        };
        if depth > self.recursion_limit {
            return Err(MetapathError::RecursionLimitExceeded {
                limit: self.recursion_limit,
            });
        }
        Ok(guard)
    }
}

pub struct CallGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct DynamicContextBuilder {
    context: DynamicContext,
}

impl DynamicContextBuilder {
    pub fn variable(mut self, name: impl Into<String>, value: Sequence) -> Self {
        self.context.variables = self.context.variables.bind(name, value);
        self
    }

    pub fn implicit_timezone(mut self, offset: FixedOffset) -> Self {
        self.context.implicit_timezone = offset;
        self
    }

    pub fn current_date_time(mut self, now: DateTime<FixedOffset>) -> Self {
        self.context.current_date_time = now;
        self
    }

    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.context.recursion_limit = limit;
        self
    }

    pub fn build(self) -> DynamicContext {
        self.context
    }
}

/// The focus of an evaluation: a context sequence and, when iterating it, the
/// current position.
///
/// Without a position the whole sequence is the context: `.` yields every
/// item and `last()` its size.
#[derive(Debug, Clone, Default)]
pub struct Focus {
    sequence: Sequence,
    position: Option<usize>,
}

impl Focus {
    /// No context item at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of_item(item: Item) -> Self {
        Self {
            sequence: Sequence::from_item(item),
            position: Some(1),
        }
    }

    pub fn of_sequence(sequence: Sequence) -> Self {
        Self {
            sequence,
            position: None,
        }
    }

    /// The focus on item `position` (1-based) of `sequence`.
    pub fn at(sequence: Sequence, position: usize) -> Self {
        Self {
            sequence,
            position: Some(position),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.sequence.is_empty()
    }

    /// The items `.` evaluates to.
    pub fn context_items(&self) -> Sequence {
        match self.position {
            Some(p) => Sequence::from_optional(self.sequence.get(p - 1)),
            None => self.sequence.clone(),
        }
    }

    /// The single context item; `XPDY0002` without one.
    pub fn context_item(&self) -> Result<Item, MetapathError> {
        match self.position {
            Some(p) => self.sequence.get(p - 1).ok_or(MetapathError::NoContextItem),
            None => match self.sequence.get_first(true) {
                Ok(Some(item)) => Ok(item),
                Ok(None) => Err(MetapathError::NoContextItem),
                Err(_) => Err(MetapathError::type_error(
                    codes::XPTY0004,
                    "The focus holds more than one item where a single context item is required",
                )),
            },
        }
    }

    pub fn position(&self) -> Result<usize, MetapathError> {
        match self.position {
            Some(p) => Ok(p),
            None if self.sequence.is_empty() => Err(MetapathError::NoContextItem),
            None => Ok(1),
        }
    }

    /// The context size; `0` for an absent focus.
    pub fn size(&self) -> usize {
        self.sequence.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AtomicValue;

    #[test]
    fn test_variables_shadow_without_mutation() {
        let outer = Variables::new().bind("x", Sequence::from_integer(1));
        let inner = outer.bind("x", Sequence::from_integer(2));
        assert_eq!(outer.get("x"), Some(&Sequence::from_integer(1)));
        assert_eq!(inner.get("x"), Some(&Sequence::from_integer(2)));
        assert!(inner.get("y").is_none());
    }

    #[test]
    fn test_undefined_variable() {
        let ctx = DynamicContext::default();
        let err = ctx.variable("missing").unwrap_err();
        assert_eq!(err.code(), codes::XPST0008);
    }

    #[test]
    fn test_recursion_guard() {
        let ctx = DynamicContext::builder(Arc::new(StaticContext::default()))
            .recursion_limit(2)
            .build();
        let a = ctx.enter_call().unwrap();
        let b = ctx.enter_call().unwrap();
        assert!(matches!(
            ctx.enter_call(),
            Err(MetapathError::RecursionLimitExceeded { limit: 2 })
        ));
        drop(b);
        drop(a);
        assert!(ctx.enter_call().is_ok());
    }

    #[test]
    fn test_focus_size_and_position() {
        assert_eq!(Focus::none().size(), 0);
        assert!(matches!(
            Focus::none().context_item(),
            Err(MetapathError::NoContextItem)
        ));
        let seq = Sequence::from_atomics((1..=3).map(AtomicValue::Integer));
        let focus = Focus::of_sequence(seq.clone());
        assert_eq!(focus.size(), 3);
        assert_eq!(focus.context_items().len(), 3);
        let at = Focus::at(seq, 2);
        assert_eq!(at.position().unwrap(), 2);
        assert_eq!(
            at.context_item().unwrap(),
            Item::Atomic(AtomicValue::Integer(2))
        );
    }

    #[test]
    fn test_default_namespaces() {
        let ctx = StaticContext::default();
        assert_eq!(ctx.namespace_uri("fn"), Some(functions::FN));
        assert_eq!(ctx.namespace_uri("mp"), Some(functions::MP));
        let custom = StaticContext::builder().namespace("ex", "urn:example").build();
        assert_eq!(custom.namespace_uri("ex"), Some("urn:example"));
    }
}
