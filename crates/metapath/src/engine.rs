//! Evaluation of compiled expressions.
//!
//! [`evaluate`] dispatches on the [`Expr`] variant. Every call receives the
//! dynamic context, which carries variables and the recursion budget, and the
//! focus the expression is evaluated against. Steps without predicates over a
//! single context node yield lazy sequences; everything else is materialized.
use std::sync::Arc;

use metaschema_model::NodeKind;

use crate::ast::{Axis, NodeTest, Quantifier};
use crate::axes;
use crate::context::{DynamicContext, Focus, Variables};
use crate::error::{MetapathError, codes};
use crate::expr::{ArithmeticOp, ComparisonOp, Expr, InlineFunctionDecl, LookupKey};
use crate::functions::{CallContext, Function, coerce, hof};
use crate::operators;
use crate::types::{
    AtomicType, AtomicValue, FunctionItem, Item, Sequence, SequenceType, XdmArray, XdmMap, cast,
};

pub fn evaluate(
    expr: &Expr,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::ContextItem => evaluate_context_item(focus),
        Expr::Root => evaluate_root(focus),
        Expr::Variable(name) => ctx.variable(name),
        Expr::Sequence(exprs) => {
            let mut parts = Vec::with_capacity(exprs.len());
            for e in exprs {
                parts.push(evaluate(e, ctx, focus)?);
            }
            Ok(Sequence::concat(parts))
        }

        Expr::Step {
            axis,
            test,
            predicates,
        } => evaluate_step(*axis, test, predicates, ctx, focus),
        Expr::Path { left, right } => evaluate_path(left, right, ctx, focus),
        Expr::Filter { base, predicates } => {
            let base = evaluate(base, ctx, focus)?;
            if predicates.is_empty() {
                return Ok(base);
            }
            Ok(Sequence::from_items(apply_predicates(
                base.to_vec(),
                predicates,
                ctx,
            )?))
        }

        Expr::FunctionCall { function, args } => {
            evaluate_function_call(function, args, ctx, focus)
        }
        Expr::PartialCall { function, args } => {
            let base = Item::Function(FunctionItem::Builtin {
                function: Arc::clone(function),
                arity: args.len(),
            });
            let bound = evaluate_arguments(args, ctx, focus)?;
            Ok(Sequence::from_item(Item::Function(FunctionItem::Partial {
                base: Box::new(base),
                bound,
            })))
        }
        Expr::DynamicCall { function, args } => {
            evaluate_dynamic_call(function, args, ctx, focus)
        }
        Expr::NamedFunctionRef { function, arity } => {
            Ok(Sequence::from_item(Item::Function(FunctionItem::Builtin {
                function: Arc::clone(function),
                arity: *arity,
            })))
        }
        Expr::InlineFunction(decl) => Ok(Sequence::from_item(Item::Function(
            FunctionItem::Inline {
                decl: Arc::clone(decl),
                captured: ctx.variables().clone(),
            },
        ))),

        Expr::Arithmetic { left, op, right } => evaluate_arithmetic(left, *op, right, ctx, focus),
        Expr::Negate(operand) => match evaluate(operand, ctx, focus)?.atomize_optional()? {
            Some(value) => Ok(Sequence::from_atomic(operators::negate(&value)?)),
            None => Ok(Sequence::empty()),
        },
        Expr::GeneralComparison { left, op, right } => {
            let l = evaluate(left, ctx, focus)?.atomize()?;
            let r = evaluate(right, ctx, focus)?.atomize()?;
            Ok(Sequence::from_bool(operators::general_compare(
                *op,
                &l,
                &r,
                ctx.implicit_timezone(),
            )?))
        }
        Expr::ValueComparison { left, op, right } => {
            evaluate_value_comparison(left, *op, right, ctx, focus)
        }
        Expr::NodeComparison { left, op, right } => {
            let l = evaluate(left, ctx, focus)?;
            let r = evaluate(right, ctx, focus)?;
            Ok(match operators::node_compare(*op, &l, &r)? {
                Some(result) => Sequence::from_bool(result),
                None => Sequence::empty(),
            })
        }
        Expr::And(left, right) => {
            let result = evaluate(left, ctx, focus)?.effective_boolean_value()?
                && evaluate(right, ctx, focus)?.effective_boolean_value()?;
            Ok(Sequence::from_bool(result))
        }
        Expr::Or(left, right) => {
            let result = evaluate(left, ctx, focus)?.effective_boolean_value()?
                || evaluate(right, ctx, focus)?.effective_boolean_value()?;
            Ok(Sequence::from_bool(result))
        }
        Expr::SetOp { left, op, right } => {
            let l = evaluate(left, ctx, focus)?;
            let r = evaluate(right, ctx, focus)?;
            operators::set_operation(*op, &l, &r)
        }
        Expr::Range { start, end } => evaluate_range(start, end, ctx, focus),
        Expr::StringConcat(parts) => {
            let mut out = String::new();
            for part in parts {
                if let Some(value) = evaluate(part, ctx, focus)?.atomize_optional()? {
                    out.push_str(&value.to_string_value());
                }
            }
            Ok(Sequence::from_string(out))
        }
        Expr::SimpleMap { base, mapping } => evaluate_simple_map(base, mapping, ctx, focus),

        Expr::Let { name, value, body } => {
            let value = evaluate(value, ctx, focus)?;
            evaluate(body, &ctx.bind(name.clone(), value), focus)
        }
        Expr::For { name, source, body } => evaluate_for(name, source, body, ctx, focus),
        Expr::Quantified {
            quantifier,
            bindings,
            satisfies,
        } => Ok(Sequence::from_bool(evaluate_quantified(
            *quantifier,
            bindings,
            satisfies,
            ctx,
            focus,
        )?)),
        Expr::If {
            condition,
            then_expr,
            else_expr,
        } => {
            if evaluate(condition, ctx, focus)?.effective_boolean_value()? {
                evaluate(then_expr, ctx, focus)
            } else {
                evaluate(else_expr, ctx, focus)
            }
        }

        Expr::Lookup { base, key } => {
            let base = evaluate(base, ctx, focus)?;
            evaluate_lookup(&base, key, ctx, focus)
        }
        Expr::UnaryLookup(key) => {
            if focus.is_absent() {
                return Err(MetapathError::NoContextItem);
            }
            evaluate_lookup(&focus.context_items(), key, ctx, focus)
        }
        Expr::MapConstructor(entries) => evaluate_map_constructor(entries, ctx, focus),
        Expr::SquareArray(members) => {
            let mut values = Vec::with_capacity(members.len());
            for member in members {
                values.push(evaluate(member, ctx, focus)?);
            }
            Ok(Sequence::from_item(Item::Array(XdmArray::from_members(
                values,
            ))))
        }
        Expr::CurlyArray(content) => {
            let members = evaluate(content, ctx, focus)?
                .iter()
                .map(Sequence::from_item)
                .collect();
            Ok(Sequence::from_item(Item::Array(XdmArray::from_members(
                members,
            ))))
        }

        Expr::InstanceOf {
            expr,
            sequence_type,
        } => {
            let value = evaluate(expr, ctx, focus)?;
            Ok(Sequence::from_bool(sequence_type.matches(&value)))
        }
        Expr::TreatAs {
            expr,
            sequence_type,
        } => evaluate_treat_as(expr, sequence_type, ctx, focus),
        Expr::CastAs {
            expr,
            target,
            allow_empty,
        } => evaluate_cast_as(expr, *target, *allow_empty, ctx, focus),
        Expr::CastableAs {
            expr,
            target,
            allow_empty,
        } => evaluate_castable_as(expr, *target, *allow_empty, ctx, focus),
        Expr::Atomize(operand) => {
            let value = evaluate(operand, ctx, focus)?;
            Ok(Sequence::from_atomics(value.atomize()?))
        }
    }
}

/// Invokes an inline function with already evaluated arguments. The body
/// sees the captured variables and its parameters but no focus.
pub(crate) fn invoke_inline(
    decl: &InlineFunctionDecl,
    captured: &Variables,
    args: Vec<Sequence>,
    ctx: &DynamicContext,
) -> Result<Sequence, MetapathError> {
    if args.len() != decl.params.len() {
        return Err(MetapathError::type_error(
            codes::XPTY0004,
            format!(
                "Inline function expects {} arguments, got {}",
                decl.params.len(),
                args.len()
            ),
        ));
    }
    let _guard = ctx.enter_call()?;
    let mut variables = captured.clone();
    for (param, value) in decl.params.iter().zip(args) {
        let value = match &param.sequence_type {
            Some(expected) => coerce(value, expected, || format!("Parameter ${}", param.name))?,
            None => value,
        };
        variables = variables.bind(param.name.clone(), value);
    }
    let result = evaluate(&decl.body, &ctx.with_variables(variables), &Focus::none())?;
    match &decl.return_type {
        Some(expected) => coerce(result, expected, || "Inline function result".to_string()),
        None => Ok(result),
    }
}

fn evaluate_context_item(focus: &Focus) -> Result<Sequence, MetapathError> {
    if focus.is_absent() {
        return Err(MetapathError::NoContextItem);
    }
    Ok(focus.context_items())
}

fn evaluate_root(focus: &Focus) -> Result<Sequence, MetapathError> {
    if focus.is_absent() {
        return Err(MetapathError::NoContextItem);
    }
    let mut roots = Vec::new();
    for item in focus.context_items().iter() {
        let Item::Node(node) = item else {
            return Err(MetapathError::type_error(
                codes::XPTY0020,
                format!("'/' requires a node as context item, found {}", item.type_name()),
            ));
        };
        let root = node.root();
        if root.kind() != NodeKind::Document {
            return Err(MetapathError::type_error(
                codes::XPDY0050,
                "The root of the tree containing the context node is not a document node",
            ));
        }
        roots.push(Item::Node(root));
    }
    document_order(roots)
}

fn evaluate_step(
    axis: Axis,
    test: &NodeTest,
    predicates: &[Expr],
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    if focus.is_absent() {
        return Err(MetapathError::NoContextItem);
    }
    let context = focus.context_items();
    let single = context.is_singleton();
    let mut selected = Vec::new();

    for item in context.iter() {
        let Item::Node(node) = item else {
            return Err(MetapathError::type_error(
                codes::XPTY0020,
                format!(
                    "Axis step {}:: requires a node as context item, found {}",
                    axis.name(),
                    item.type_name()
                ),
            ));
        };

        if single && predicates.is_empty() && !axis.is_reverse() {
            let test = test.clone();
            let iter = axes::axis_iter(&node, axis)
                .filter(move |n| axes::matches(n, &test, axis))
                .map(Item::Node);
            return Ok(Sequence::lazy(iter));
        }

        let candidates: Vec<Item> = axes::axis_iter(&node, axis)
            .filter(|n| axes::matches(n, test, axis))
            .map(Item::Node)
            .collect();
        let mut matched = apply_predicates(candidates, predicates, ctx)?;
        if axis.is_reverse() {
            matched.reverse();
        }
        selected.extend(matched);
    }

    if single {
        Ok(Sequence::from_items(selected))
    } else {
        document_order(selected)
    }
}

fn evaluate_path(
    left: &Expr,
    right: &Expr,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let base = evaluate(left, ctx, focus)?;

    let mut results = Vec::new();
    let mut node_count = 0;
    for (index, item) in base.iter().enumerate() {
        if !item.is_node() {
            return Err(MetapathError::type_error(
                codes::XPTY0019,
                format!(
                    "The left side of '/' must yield nodes, found {}",
                    item.type_name()
                ),
            ));
        }
        let inner = Focus::at(base.clone(), index + 1);
        let value = evaluate(right, ctx, &inner)?;
        if index == 0 && matches!(right, Expr::Step { .. }) && base.is_singleton() {
            return Ok(value);
        }
        for item in value.iter() {
            if item.is_node() {
                node_count += 1;
            }
            results.push(item);
        }
    }

    if node_count == results.len() {
        document_order(results)
    } else if node_count == 0 {
        Ok(Sequence::from_items(results))
    } else {
        Err(MetapathError::type_error(
            codes::XPTY0018,
            "The last step of a path yields both nodes and non-nodes",
        ))
    }
}

/// Sorts nodes into document order and removes duplicates.
fn document_order(items: Vec<Item>) -> Result<Sequence, MetapathError> {
    let mut nodes = Sequence::from_items(items).nodes()?;
    nodes.sort();
    nodes.dedup();
    Ok(Sequence::from_nodes(nodes))
}

/// Filters `items` through each predicate in turn. A numeric predicate
/// value selects by position, anything else by effective boolean value.
fn apply_predicates(
    mut items: Vec<Item>,
    predicates: &[Expr],
    ctx: &DynamicContext,
) -> Result<Vec<Item>, MetapathError> {
    for predicate in predicates {
        if items.is_empty() {
            break;
        }
        if let Some(position) = literal_position(predicate) {
            items = position
                .and_then(|p| items.get(p - 1).cloned())
                .into_iter()
                .collect();
            continue;
        }

        let context = Sequence::from_items(items.clone());
        let mut kept = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            let position = index + 1;
            let result = evaluate(predicate, ctx, &Focus::at(context.clone(), position))?;
            if predicate_holds(&result, position)? {
                kept.push(item);
            }
        }
        items = kept;
    }
    Ok(items)
}

/// `Some(Some(p))` for an integer literal predicate `[p]`, `Some(None)` when
/// the literal can never match a position.
fn literal_position(predicate: &Expr) -> Option<Option<usize>> {
    let Expr::Literal(value) = predicate else {
        return None;
    };
    if !value.is_singleton() {
        return None;
    }
    match value.first() {
        Some(Item::Atomic(AtomicValue::Integer(i))) => {
            Some(usize::try_from(i).ok().filter(|p| *p >= 1))
        }
        _ => None,
    }
}

fn predicate_holds(result: &Sequence, position: usize) -> Result<bool, MetapathError> {
    if result.is_singleton()
        && let Some(Item::Atomic(value)) = result.first()
        && value.is_numeric()
    {
        return Ok(value.to_double() == Some(position as f64));
    }
    result.effective_boolean_value()
}

fn evaluate_arguments(
    args: &[Option<Expr>],
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Vec<Option<Sequence>>, MetapathError> {
    args.iter()
        .map(|arg| match arg {
            Some(e) => evaluate(e, ctx, focus).map(Some),
            None => Ok(None),
        })
        .collect()
}

fn evaluate_function_call(
    function: &Function,
    args: &[Expr],
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(evaluate(arg, ctx, focus)?);
    }
    function.invoke(values, &CallContext::new(ctx, focus))
}

fn evaluate_dynamic_call(
    function: &Expr,
    args: &[Option<Expr>],
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let target = evaluate(function, ctx, focus)?;
    let item = match target.get_first(true) {
        Ok(Some(item)) if item.is_function() => item,
        Ok(Some(item)) => {
            return Err(MetapathError::type_error(
                codes::XPTY0004,
                format!("Dynamic function call on a {}", item.type_name()),
            ));
        }
        _ => {
            return Err(MetapathError::type_error(
                codes::XPTY0004,
                "Dynamic function call requires exactly one function item",
            ));
        }
    };

    let arity = hof::item_arity(&item);
    if arity != Some(args.len()) {
        return Err(MetapathError::type_error(
            codes::XPTY0004,
            format!(
                "Function of arity {} called with {} arguments",
                arity.unwrap_or(0),
                args.len()
            ),
        ));
    }

    let bound = evaluate_arguments(args, ctx, focus)?;
    if bound.iter().any(Option::is_none) {
        return Ok(Sequence::from_item(Item::Function(FunctionItem::Partial {
            base: Box::new(item),
            bound,
        })));
    }
    let values = bound.into_iter().flatten().collect();
    hof::invoke_function(&item, values, &CallContext::new(ctx, focus))
}

fn evaluate_arithmetic(
    left: &Expr,
    op: ArithmeticOp,
    right: &Expr,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let Some(l) = evaluate(left, ctx, focus)?.atomize_optional()? else {
        return Ok(Sequence::empty());
    };
    let Some(r) = evaluate(right, ctx, focus)?.atomize_optional()? else {
        return Ok(Sequence::empty());
    };
    let value = operators::arithmetic(op, &l, &r, ctx.implicit_timezone())?;
    Ok(Sequence::from_atomic(value))
}

fn evaluate_value_comparison(
    left: &Expr,
    op: ComparisonOp,
    right: &Expr,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let Some(l) = evaluate(left, ctx, focus)?.atomize_optional()? else {
        return Ok(Sequence::empty());
    };
    let Some(r) = evaluate(right, ctx, focus)?.atomize_optional()? else {
        return Ok(Sequence::empty());
    };
    let result = operators::value_compare(op, &l, &r, ctx.implicit_timezone())?;
    Ok(Sequence::from_bool(result))
}

fn range_bound(value: AtomicValue) -> Result<i64, MetapathError> {
    match value {
        AtomicValue::Integer(i) => Ok(i),
        AtomicValue::UntypedAtomic(_) => match cast::cast(&value, AtomicType::Integer)? {
            AtomicValue::Integer(i) => Ok(i),
            _ => Err(MetapathError::type_error(
                codes::XPTY0004,
                "Range bound is not an integer",
            )),
        },
        other => Err(MetapathError::type_error(
            codes::XPTY0004,
            format!("Range bounds must be xs:integer, found {}", other.type_name()),
        )),
    }
}

fn evaluate_range(
    start: &Expr,
    end: &Expr,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let Some(start) = evaluate(start, ctx, focus)?.atomize_optional()? else {
        return Ok(Sequence::empty());
    };
    let Some(end) = evaluate(end, ctx, focus)?.atomize_optional()? else {
        return Ok(Sequence::empty());
    };
    let (start, end) = (range_bound(start)?, range_bound(end)?);
    if start > end {
        return Ok(Sequence::empty());
    }
    Ok(Sequence::lazy(
        (start..=end).map(|i| Item::Atomic(AtomicValue::Integer(i))),
    ))
}

fn evaluate_simple_map(
    base: &Expr,
    mapping: &Expr,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let base = evaluate(base, ctx, focus)?;
    let mut parts = Vec::new();
    for index in 0..base.len() {
        parts.push(evaluate(mapping, ctx, &Focus::at(base.clone(), index + 1))?);
    }
    Ok(Sequence::concat(parts))
}

fn evaluate_for(
    name: &str,
    source: &Expr,
    body: &Expr,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let source = evaluate(source, ctx, focus)?;
    let mut parts = Vec::new();
    for item in source.iter() {
        let inner = ctx.bind(name, Sequence::from_item(item));
        parts.push(evaluate(body, &inner, focus)?);
    }
    Ok(Sequence::concat(parts))
}

fn evaluate_quantified(
    quantifier: Quantifier,
    bindings: &[(String, Expr)],
    satisfies: &Expr,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<bool, MetapathError> {
    let Some(((name, source), rest)) = bindings.split_first() else {
        return evaluate(satisfies, ctx, focus)?.effective_boolean_value();
    };
    let values = evaluate(source, ctx, focus)?;
    for item in values.iter() {
        let inner = ctx.bind(name.clone(), Sequence::from_item(item));
        let holds = evaluate_quantified(quantifier, rest, satisfies, &inner, focus)?;
        match quantifier {
            Quantifier::Some if holds => return Ok(true),
            Quantifier::Every if !holds => return Ok(false),
            _ => {}
        }
    }
    Ok(quantifier == Quantifier::Every)
}

/// The keys a lookup selects; `None` for the wildcard.
fn lookup_keys(
    key: &LookupKey,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Option<Vec<AtomicValue>>, MetapathError> {
    Ok(match key {
        LookupKey::Wildcard => None,
        LookupKey::Name(name) => Some(vec![AtomicValue::String(name.clone())]),
        LookupKey::Integer(i) => Some(vec![AtomicValue::Integer(*i)]),
        LookupKey::Computed(e) => Some(evaluate(e, ctx, focus)?.atomize()?),
    })
}

fn evaluate_lookup(
    base: &Sequence,
    key: &LookupKey,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let keys = lookup_keys(key, ctx, focus)?;
    let mut parts = Vec::new();
    for item in base.iter() {
        match (&item, &keys) {
            (Item::Map(map), None) => parts.extend(map.entries().map(|(_, v)| v.clone())),
            (Item::Map(map), Some(keys)) => {
                for key in keys {
                    if let Some(value) = map.get(key) {
                        parts.push(value.clone());
                    }
                }
            }
            (Item::Array(array), None) => parts.extend(array.members().iter().cloned()),
            (Item::Array(array), Some(keys)) => {
                for key in keys {
                    parts.push(array.get(array_position(key)?)?.clone());
                }
            }
            (other, _) => {
                return Err(MetapathError::type_error(
                    codes::XPTY0004,
                    format!("Lookup requires a map or array, found {}", other.type_name()),
                ));
            }
        }
    }
    Ok(Sequence::concat(parts))
}

fn array_position(key: &AtomicValue) -> Result<i64, MetapathError> {
    match key {
        AtomicValue::Integer(i) => Ok(*i),
        AtomicValue::UntypedAtomic(_) => match cast::cast(key, AtomicType::Integer)? {
            AtomicValue::Integer(i) => Ok(i),
            _ => Err(MetapathError::type_error(
                codes::XPTY0004,
                "Array lookup key is not an integer",
            )),
        },
        other => Err(MetapathError::type_error(
            codes::XPTY0004,
            format!("Array lookup key must be xs:integer, found {}", other.type_name()),
        )),
    }
}

fn evaluate_map_constructor(
    entries: &[(Expr, Expr)],
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let mut values = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let Some(key) = evaluate(key, ctx, focus)?.atomize_optional()? else {
            return Err(MetapathError::type_error(
                codes::XPTY0004,
                "A map key must be a single atomic value",
            ));
        };
        values.push((key, evaluate(value, ctx, focus)?));
    }
    Ok(Sequence::from_item(Item::Map(XdmMap::try_from_entries(
        values,
    )?)))
}

fn evaluate_treat_as(
    expr: &Expr,
    sequence_type: &SequenceType,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let value = evaluate(expr, ctx, focus)?;
    if sequence_type.matches(&value) {
        Ok(value)
    } else {
        Err(MetapathError::type_error(
            codes::XPDY0050,
            format!("Value does not match required type {}", sequence_type),
        ))
    }
}

fn evaluate_cast_as(
    expr: &Expr,
    target: AtomicType,
    allow_empty: bool,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let values = evaluate(expr, ctx, focus)?.atomize()?;
    match values.as_slice() {
        [] if allow_empty => Ok(Sequence::empty()),
        [value] => Ok(Sequence::from_atomic(cast::cast(value, target)?)),
        _ => Err(MetapathError::type_error(
            codes::XPTY0004,
            format!(
                "cast as {} requires exactly one atomic value, found {}",
                target,
                values.len()
            ),
        )),
    }
}

fn evaluate_castable_as(
    expr: &Expr,
    target: AtomicType,
    allow_empty: bool,
    ctx: &DynamicContext,
    focus: &Focus,
) -> Result<Sequence, MetapathError> {
    let values = evaluate(expr, ctx, focus)?.atomize()?;
    let castable = match values.as_slice() {
        [] => allow_empty,
        [value] => cast::castable(value, target),
        _ => false,
    };
    Ok(Sequence::from_bool(castable))
}

#[cfg(test)]
mod tests {
    use metaschema_model::{DataType, Document};

    use super::*;
    use crate::compiler::compile;
    use crate::context::StaticContext;
    use crate::parser::parse_expression;

    fn compiled(source: &str) -> Expr {
        let ast = parse_expression(source).unwrap();
        compile(&ast, &StaticContext::default()).unwrap()
    }

    fn eval(source: &str) -> Result<Sequence, MetapathError> {
        evaluate(&compiled(source), &DynamicContext::default(), &Focus::none())
    }

    fn eval_on(source: &str, doc: &Document) -> Result<Sequence, MetapathError> {
        let focus = Focus::of_item(Item::Node(doc.root()));
        evaluate(&compiled(source), &DynamicContext::default(), &focus)
    }

    fn integers(seq: &Sequence) -> Vec<i64> {
        seq.iter()
            .map(|item| match item {
                Item::Atomic(AtomicValue::Integer(i)) => i,
                other => panic!("Expected integer, found {:?}", other),
            })
            .collect()
    }

    fn sample() -> Document {
        Document::builder()
            .root_assembly("catalog", |c| {
                c.flag("id", DataType::Token, "cat")
                    .field("title", DataType::String, "Catalog")
                    .assembly("group", |g| {
                        g.flag("id", DataType::Token, "g1")
                            .field("title", DataType::String, "First")
                            .assembly("control", |ctl| {
                                ctl.flag("id", DataType::Token, "ac-1");
                            })
                            .assembly("control", |ctl| {
                                ctl.flag("id", DataType::Token, "ac-2");
                            });
                    })
                    .assembly("group", |g| {
                        g.flag("id", DataType::Token, "g2");
                    });
            })
            .build()
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(integers(&eval("1 + 2 * 3").unwrap()), vec![7]);
        assert_eq!(integers(&eval("-(2 - 5)").unwrap()), vec![3]);
        assert!(eval("() + 1").unwrap().is_empty());
        let err = eval("'a' + 1").unwrap_err();
        assert_eq!(err.code(), codes::XPTY0004);
    }

    #[test]
    fn test_predicates_and_ranges() {
        assert_eq!(integers(&eval("(1 to 5)[. mod 2 = 0]").unwrap()), vec![2, 4]);
        assert_eq!(integers(&eval("(10, 20, 30)[2]").unwrap()), vec![20]);
        assert!(eval("(10, 20)[0]").unwrap().is_empty());
        assert!(eval("5 to 1").unwrap().is_empty());
        assert_eq!(integers(&eval("(1, 2) ! (. * 10)").unwrap()), vec![10, 20]);
    }

    #[test]
    fn test_paths_over_model() {
        let doc = sample();
        let ids = eval_on("/catalog/group/@id", &doc).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|i| i.as_node().map(|n| n.kind()) == Some(NodeKind::Flag)));

        let found = eval_on("//control/@id = 'ac-2'", &doc).unwrap();
        assert_eq!(found, Sequence::from_bool(true));

        let controls = eval_on("/catalog/group/control", &doc).unwrap();
        assert_eq!(controls.len(), 2);
    }

    #[test]
    fn test_reverse_axis_positions() {
        let doc = sample();
        let nearest = eval_on("(//control)[1]/ancestor::*[1]", &doc).unwrap();
        let node = nearest.first().and_then(|i| i.as_node().cloned()).unwrap();
        assert_eq!(node.name(), Some("group"));

        let before = eval_on("(//control)[2]/preceding-sibling::*", &doc).unwrap();
        let names: Vec<_> = before
            .iter()
            .map(|i| i.as_node().and_then(|n| n.name().map(str::to_string)).unwrap())
            .collect();
        assert_eq!(names, vec!["title", "control"]);
    }

    #[test]
    fn test_path_type_errors() {
        let doc = sample();
        let err = eval_on("(1, 2)/3", &doc).unwrap_err();
        assert_eq!(err.code(), codes::XPTY0019);
        let err = eval_on("/catalog/(title, 1)", &doc).unwrap_err();
        assert_eq!(err.code(), codes::XPTY0018);
        let err = eval(".").unwrap_err();
        assert_eq!(err.code(), codes::XPDY0002);
    }

    #[test]
    fn test_bindings_and_quantifiers() {
        assert_eq!(
            integers(&eval("for $x in (1, 2, 3) return $x * $x").unwrap()),
            vec![1, 4, 9]
        );
        assert_eq!(
            integers(&eval("let $a := 2, $b := $a + 1 return $a * $b").unwrap()),
            vec![6]
        );
        assert_eq!(
            eval("some $x in (1, 2, 3) satisfies $x > 2").unwrap(),
            Sequence::from_bool(true)
        );
        assert_eq!(
            eval("every $x in (1, 2, 3) satisfies $x > 2").unwrap(),
            Sequence::from_bool(false)
        );
        assert_eq!(
            eval("if (()) then 1 else 2").unwrap(),
            Sequence::from_integer(2)
        );
    }

    #[test]
    fn test_maps_and_arrays() {
        assert_eq!(
            eval("let $m := map { 'a': 1, 'b': 2 } return $m?b").unwrap(),
            Sequence::from_integer(2)
        );
        assert_eq!(eval("[1, 2, 3]?2").unwrap(), Sequence::from_integer(2));
        assert_eq!(integers(&eval("array { 1, 2 }?*").unwrap()), vec![1, 2]);
        let err = eval("[1, 2]?3").unwrap_err();
        assert_eq!(err.code(), codes::FOAY0001);
        let err = eval("map { 'a': 1, 'a': 2 }").unwrap_err();
        assert_eq!(err.code(), codes::XQDY0137);
        let err = eval("(1)?a").unwrap_err();
        assert_eq!(err.code(), codes::XPTY0004);
    }

    #[test]
    fn test_function_items() {
        assert_eq!(
            eval("let $f := function($x) { $x + 1 } return $f(41)").unwrap(),
            Sequence::from_integer(42)
        );
        assert_eq!(
            eval("let $add := function($a, $b) { $a + $b } return $add(?, 10)(5)").unwrap(),
            Sequence::from_integer(15)
        );
        assert_eq!(
            eval("let $n := 3, $f := function($x) { $x * $n } return $f(2)").unwrap(),
            Sequence::from_integer(6)
        );
    }

    #[test]
    fn test_recursion_limit() {
        let ctx = DynamicContext::builder(Arc::new(StaticContext::default()))
            .recursion_limit(16)
            .build();
        let expr = compiled(
            "let $f := function($f, $n) { if ($n = 0) then 0 else $f($f, $n - 1) } \
             return $f($f, 100)",
        );
        let err = evaluate(&expr, &ctx, &Focus::none()).unwrap_err();
        assert!(matches!(err, MetapathError::RecursionLimitExceeded { limit: 16 }));

        let expr = compiled(
            "let $f := function($f, $n) { if ($n = 0) then 0 else $f($f, $n - 1) } \
             return $f($f, 5)",
        );
        assert_eq!(
            evaluate(&expr, &ctx, &Focus::none()).unwrap(),
            Sequence::from_integer(0)
        );
    }

    #[test]
    fn test_type_expressions() {
        assert_eq!(
            eval("'12' cast as xs:integer").unwrap(),
            Sequence::from_integer(12)
        );
        assert_eq!(
            eval("'x' castable as xs:integer").unwrap(),
            Sequence::from_bool(false)
        );
        assert!(eval("() cast as xs:integer?").unwrap().is_empty());
        assert_eq!(
            eval("(1, 2) instance of xs:integer+").unwrap(),
            Sequence::from_bool(true)
        );
        let err = eval("1 treat as xs:string").unwrap_err();
        assert_eq!(err.code(), codes::XPDY0050);
    }

    #[test]
    fn test_comparisons_and_concat() {
        assert_eq!(eval("(1, 2) = (2, 3)").unwrap(), Sequence::from_bool(true));
        assert_eq!(eval("1 lt 2").unwrap(), Sequence::from_bool(true));
        assert!(eval("() eq 1").unwrap().is_empty());
        assert_eq!(eval("1 || 2 || 'x'").unwrap(), Sequence::from_string("12x"));
    }
}
