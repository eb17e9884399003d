//! Compiled, reusable Metapath expressions.
use std::fmt;
use std::sync::Arc;

use crate::compiler;
use crate::context::{DynamicContext, Focus, StaticContext};
use crate::engine;
use crate::error::MetapathError;
use crate::expr::Expr;
use crate::parser::parse_expression;
use crate::types::{Item, Occurrence, Sequence};

/// A parsed and statically checked expression.
///
/// The executable tree sits behind an `Arc`, so clones are cheap and a single
/// compiled expression can be evaluated from many threads at once.
#[derive(Clone)]
pub struct MetapathExpression {
    source: Arc<str>,
    expr: Arc<Expr>,
}

impl MetapathExpression {
    /// Compiles `source` against the default static context.
    pub fn compile(source: &str) -> Result<Self, MetapathError> {
        Self::compile_with(source, &StaticContext::default())
    }

    pub fn compile_with(source: &str, context: &StaticContext) -> Result<Self, MetapathError> {
        let ast = parse_expression(source)?;
        let expr = compiler::compile(&ast, context)?;
        log::debug!("Compiled Metapath expression '{}'", source);
        Ok(Self {
            source: Arc::from(source),
            expr: Arc::new(expr),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the result depends on the context item, position or size.
    pub fn is_focus_dependent(&self) -> bool {
        self.expr.is_focus_dependent()
    }

    pub fn cardinality(&self) -> Occurrence {
        self.expr.cardinality()
    }

    /// Evaluates with `context_item` as a singleton focus, or with no focus
    /// at all when it is `None`.
    pub fn evaluate(
        &self,
        context_item: Option<Item>,
        ctx: &DynamicContext,
    ) -> Result<Sequence, MetapathError> {
        let focus = match context_item {
            Some(item) => Focus::of_item(item),
            None => Focus::none(),
        };
        engine::evaluate(&self.expr, ctx, &focus)
    }

    /// Evaluates with the whole of `focus` as the context sequence: `.` yields
    /// every item and `last()` its length.
    pub fn evaluate_with_focus(
        &self,
        focus: &Sequence,
        ctx: &DynamicContext,
    ) -> Result<Sequence, MetapathError> {
        engine::evaluate(&self.expr, ctx, &Focus::of_sequence(focus.clone()))
    }

    /// The effective boolean value of the result.
    pub fn evaluate_as_boolean(
        &self,
        context_item: Option<Item>,
        ctx: &DynamicContext,
    ) -> Result<bool, MetapathError> {
        self.evaluate(context_item, ctx)?.effective_boolean_value()
    }

    /// The string value of the first item, or the empty string for an empty
    /// result.
    pub fn evaluate_as_string(
        &self,
        context_item: Option<Item>,
        ctx: &DynamicContext,
    ) -> Result<String, MetapathError> {
        match self.evaluate(context_item, ctx)?.first() {
            Some(item) => item.string_value(),
            None => Ok(String::new()),
        }
    }

    /// The single item of the result; more than one item is an error.
    pub fn evaluate_as_item(
        &self,
        context_item: Option<Item>,
        ctx: &DynamicContext,
    ) -> Result<Option<Item>, MetapathError> {
        self.evaluate(context_item, ctx)?.get_first(true)
    }
}

impl fmt::Debug for MetapathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MetapathExpression").field(&self.source).finish()
    }
}

impl fmt::Display for MetapathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::types::AtomicValue;

    #[test]
    fn test_compile_keeps_source() {
        let expr = MetapathExpression::compile("1 + 2").unwrap();
        assert_eq!(expr.source(), "1 + 2");
        assert_eq!(expr.to_string(), "1 + 2");
        assert!(!expr.is_focus_dependent());
        assert!(MetapathExpression::compile(".").unwrap().is_focus_dependent());
    }

    #[test]
    fn test_syntax_error_is_static() {
        let err = MetapathExpression::compile("1 +").unwrap_err();
        assert!(err.is_static());
    }

    #[test]
    fn test_typed_helpers() {
        let ctx = DynamicContext::default();
        let expr = MetapathExpression::compile("(1, 2)[. > 1]").unwrap();
        assert!(expr.evaluate_as_boolean(None, &ctx).unwrap());
        assert_eq!(expr.evaluate_as_string(None, &ctx).unwrap(), "2");
        assert_eq!(
            expr.evaluate_as_item(None, &ctx).unwrap(),
            Some(Item::Atomic(AtomicValue::Integer(2)))
        );
        let many = MetapathExpression::compile("(1, 2)").unwrap();
        assert!(many.evaluate_as_item(None, &ctx).is_err());
        let none = MetapathExpression::compile("()").unwrap();
        assert_eq!(none.evaluate_as_string(None, &ctx).unwrap(), "");
    }

    #[test]
    fn test_evaluate_with_focus_sequence() {
        let ctx = DynamicContext::default();
        let focus = Sequence::from_atomics([
            AtomicValue::Integer(1),
            AtomicValue::Integer(2),
            AtomicValue::Integer(3),
        ]);
        let count = MetapathExpression::compile("last()").unwrap();
        assert_eq!(
            count.evaluate_with_focus(&focus, &ctx).unwrap(),
            Sequence::from_integer(3)
        );
        let all = MetapathExpression::compile(".").unwrap();
        assert_eq!(all.evaluate_with_focus(&focus, &ctx).unwrap().len(), 3);
        let err = all.evaluate(None, &ctx).unwrap_err();
        assert_eq!(err.code(), codes::XPDY0002);
    }

    #[test]
    fn test_clones_share_tree() {
        let expr = MetapathExpression::compile("count((1, 2, 3))").unwrap();
        let copy = expr.clone();
        assert!(Arc::ptr_eq(&expr.expr, &copy.expr));
    }
}
