use std::cmp::Ordering;

use metaschema_model::{NodeKind, NodeRef};

use super::{
    CallContext, FN, Function, FunctionLibrary, any_item, any_items, arg, double_arg,
    integer_arg, many, one, opt, opt_string,
};
use crate::error::{MetapathError, codes};
use crate::expr::{ArithmeticOp, ComparisonOp};
use crate::operators::{arithmetic, atomic_equal, value_compare};
use crate::types::{
    AtomicType, AtomicValue, Item, ItemType, Occurrence, Sequence, SequenceType, cast,
    node_string_value,
};

fn fn_empty(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_bool(args[0].is_empty()))
}

fn fn_exists(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_bool(!args[0].is_empty()))
}

fn fn_head(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_optional(args[0].first()))
}

fn fn_tail(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(args[0].iter().skip(1).collect())
}

fn fn_insert_before(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let mut items = args[0].to_vec();
    let position = integer_arg(args, 1).unwrap_or(1).max(1) as usize;
    let at = (position - 1).min(items.len());
    let rest = items.split_off(at);
    items.extend(args[2].iter());
    items.extend(rest);
    Ok(Sequence::from_items(items))
}

fn fn_remove(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let position = integer_arg(args, 1).unwrap_or(0);
    Ok(args[0]
        .iter()
        .enumerate()
        .filter(|(index, _)| *index as i64 + 1 != position)
        .map(|(_, item)| item)
        .collect())
}

fn fn_reverse(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let mut items = args[0].to_vec();
    items.reverse();
    Ok(Sequence::from_items(items))
}

fn fn_subsequence(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let start = (double_arg(args, 1).unwrap_or(f64::NAN) + 0.5).floor();
    let end = if args.len() > 2 {
        start + (double_arg(args, 2).unwrap_or(f64::NAN) + 0.5).floor()
    } else {
        f64::INFINITY
    };
    Ok(args[0]
        .iter()
        .enumerate()
        .filter(|(index, _)| {
            let position = (*index + 1) as f64;
            position >= start && position < end
        })
        .map(|(_, item)| item)
        .collect())
}

fn fn_unordered(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(arg(args, 0))
}

fn collation(args: &[Sequence], index: usize) -> Result<(), MetapathError> {
    match opt_string(args, index) {
        Some(uri) => super::string::check_collation(&uri),
        None => Ok(()),
    }
}

fn atomics(sequence: &Sequence) -> Vec<AtomicValue> {
    sequence
        .iter()
        .filter_map(|item| item.as_atomic().cloned())
        .collect()
}

fn fn_distinct_values(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    collation(args, 1)?;
    let implicit = ctx.dynamic.implicit_timezone();
    let mut distinct: Vec<AtomicValue> = Vec::new();
    for value in atomics(&args[0]) {
        if !distinct.iter().any(|seen| atomic_equal(seen, &value, implicit)) {
            distinct.push(value);
        }
    }
    Ok(Sequence::from_atomics(distinct))
}

fn fn_index_of(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    collation(args, 2)?;
    let implicit = ctx.dynamic.implicit_timezone();
    let Some(search) = args[1].first().and_then(|i| i.as_atomic().cloned()) else {
        return Ok(Sequence::empty());
    };
    let positions = atomics(&args[0])
        .iter()
        .enumerate()
        .filter(|(_, value)| {
            value_compare(ComparisonOp::Eq, value, &search, implicit).unwrap_or(false)
        })
        .map(|(index, _)| AtomicValue::Integer(index as i64 + 1))
        .collect::<Vec<_>>();
    Ok(Sequence::from_atomics(positions))
}

fn deep_equal_nodes(a: &NodeRef, b: &NodeRef) -> bool {
    if a.kind() != b.kind() || a.name() != b.name() {
        return false;
    }
    if matches!(a.kind(), NodeKind::Field | NodeKind::Flag)
        && node_string_value(a) != node_string_value(b)
    {
        return false;
    }
    let (flags_a, flags_b) = (a.flags(), b.flags());
    if flags_a.len() != flags_b.len() {
        return false;
    }
    let flags_match = flags_a.iter().all(|fa| {
        flags_b
            .iter()
            .any(|fb| fa.name() == fb.name() && node_string_value(fa) == node_string_value(fb))
    });
    let (children_a, children_b) = (a.model_children(), b.model_children());
    flags_match
        && children_a.len() == children_b.len()
        && children_a
            .iter()
            .zip(&children_b)
            .all(|(x, y)| deep_equal_nodes(x, y))
}

fn deep_equal_items(a: &Item, b: &Item, ctx: &CallContext<'_>) -> Result<bool, MetapathError> {
    let implicit = ctx.dynamic.implicit_timezone();
    Ok(match (a, b) {
        (Item::Atomic(x), Item::Atomic(y)) => atomic_equal(x, y, implicit),
        (Item::Node(x), Item::Node(y)) => deep_equal_nodes(x, y),
        (Item::Map(x), Item::Map(y)) => {
            if x.size() != y.size() {
                return Ok(false);
            }
            for (key, value) in x.entries() {
                match y.get(key) {
                    Some(other) if deep_equal_sequences(value, other, ctx)? => {}
                    _ => return Ok(false),
                }
            }
            true
        }
        (Item::Array(x), Item::Array(y)) => {
            if x.size() != y.size() {
                return Ok(false);
            }
            for (m, n) in x.members().iter().zip(y.members()) {
                if !deep_equal_sequences(m, n, ctx)? {
                    return Ok(false);
                }
            }
            true
        }
        (Item::Function(_), _) | (_, Item::Function(_)) => {
            return Err(MetapathError::type_error(
                codes::FOTY0015,
                "deep-equal is not defined for function items",
            ));
        }
        _ => false,
    })
}

pub(crate) fn deep_equal_sequences(
    a: &Sequence,
    b: &Sequence,
    ctx: &CallContext<'_>,
) -> Result<bool, MetapathError> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b.iter()) {
        if !deep_equal_items(&x, &y, ctx)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn fn_deep_equal(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    collation(args, 2)?;
    Ok(Sequence::from_bool(deep_equal_sequences(
        &args[0], &args[1], ctx,
    )?))
}

fn fn_zero_or_one(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    if args[0].get(1).is_some() {
        return Err(MetapathError::cardinality(
            codes::FORG0003,
            "fn:zero-or-one called with a sequence containing more than one item",
        ));
    }
    Ok(arg(args, 0))
}

fn fn_one_or_more(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    if args[0].is_empty() {
        return Err(MetapathError::cardinality(
            codes::FORG0004,
            "fn:one-or-more called with an empty sequence",
        ));
    }
    Ok(arg(args, 0))
}

fn fn_exactly_one(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    if !args[0].is_singleton() {
        return Err(MetapathError::cardinality(
            codes::FORG0005,
            "fn:exactly-one called with a sequence containing zero or more than one item",
        ));
    }
    Ok(arg(args, 0))
}

fn fn_count(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_integer(args[0].len() as i64))
}

/// Atomic values of an aggregate input with untyped values read as doubles.
fn aggregate_values(sequence: &Sequence) -> Result<Vec<AtomicValue>, MetapathError> {
    atomics(sequence)
        .into_iter()
        .map(|value| match value {
            AtomicValue::UntypedAtomic(_) => cast::cast(&value, AtomicType::Double),
            other => Ok(other),
        })
        .collect()
}

fn invalid_aggregate(function: &str, error: MetapathError) -> MetapathError {
    MetapathError::type_error(
        codes::FORG0006,
        format!("fn:{} received values that cannot be combined: {}", function, error),
    )
}

fn total(
    values: &[AtomicValue],
    ctx: &CallContext<'_>,
    function: &str,
) -> Result<AtomicValue, MetapathError> {
    let implicit = ctx.dynamic.implicit_timezone();
    let mut iter = values.iter();
    let mut acc = iter.next().cloned().unwrap_or(AtomicValue::Integer(0));
    if !acc.is_numeric()
        && !matches!(
            acc,
            AtomicValue::DayTimeDuration(_) | AtomicValue::YearMonthDuration(_)
        )
    {
        return Err(MetapathError::type_error(
            codes::FORG0006,
            format!("fn:{} is not defined for {}", function, acc.type_name()),
        ));
    }
    for value in iter {
        acc = arithmetic(ArithmeticOp::Add, &acc, value, implicit)
            .map_err(|e| match e {
                MetapathError::Arithmetic { .. } => e,
                other => invalid_aggregate(function, other),
            })?;
    }
    Ok(acc)
}

fn fn_sum(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let values = aggregate_values(&args[0])?;
    if values.is_empty() {
        return Ok(if args.len() > 1 {
            arg(args, 1)
        } else {
            Sequence::from_integer(0)
        });
    }
    Ok(Sequence::from_atomic(total(&values, ctx, "sum")?))
}

fn fn_avg(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let values = aggregate_values(&args[0])?;
    if values.is_empty() {
        return Ok(Sequence::empty());
    }
    let sum = total(&values, ctx, "avg")?;
    let count = AtomicValue::Integer(values.len() as i64);
    Ok(Sequence::from_atomic(arithmetic(
        ArithmeticOp::Divide,
        &sum,
        &count,
        ctx.dynamic.implicit_timezone(),
    )?))
}

/// Promotes mixed numeric values to their least common type.
fn promote_numerics(values: Vec<AtomicValue>) -> Vec<AtomicValue> {
    let has_double = values.iter().any(|v| matches!(v, AtomicValue::Double(_)));
    let has_decimal = values.iter().any(|v| matches!(v, AtomicValue::Decimal(_)));
    values
        .into_iter()
        .map(|value| match value {
            AtomicValue::Integer(_) | AtomicValue::Decimal(_) if has_double => value
                .to_double()
                .map(AtomicValue::Double)
                .unwrap_or(value),
            AtomicValue::Integer(i) if has_decimal => AtomicValue::Decimal(i.into()),
            other => other,
        })
        .collect()
}

fn extreme(
    args: &[Sequence],
    ctx: &CallContext<'_>,
    wanted: Ordering,
    function: &str,
) -> Result<Sequence, MetapathError> {
    collation(args, 1)?;
    let implicit = ctx.dynamic.implicit_timezone();
    let values = promote_numerics(aggregate_values(&args[0])?);
    let mut best: Option<AtomicValue> = None;
    for value in values {
        if matches!(value, AtomicValue::Double(d) if d.is_nan()) {
            return Ok(Sequence::from_double(f64::NAN));
        }
        best = Some(match best {
            None => value,
            Some(current) => {
                let op = if wanted == Ordering::Less {
                    ComparisonOp::Lt
                } else {
                    ComparisonOp::Gt
                };
                let better = value_compare(op, &value, &current, implicit)
                    .map_err(|e| invalid_aggregate(function, e))?;
                if better { value } else { current }
            }
        });
    }
    Ok(Sequence::from_optional(best.map(Item::Atomic)))
}

fn fn_min(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    extreme(args, ctx, Ordering::Less, "min")
}

fn fn_max(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    extreme(args, ctx, Ordering::Greater, "max")
}

pub(super) fn register(library: &mut FunctionLibrary) {
    let opt_collation = || one(AtomicType::String);
    library
        .register(
            Function::new(FN, "empty", fn_empty)
                .param("arg", any_items())
                .returns(one(AtomicType::Boolean)),
        )
        .register(
            Function::new(FN, "exists", fn_exists)
                .param("arg", any_items())
                .returns(one(AtomicType::Boolean)),
        )
        .register(
            Function::new(FN, "head", fn_head)
                .param("arg", any_items())
                .returns(SequenceType::Of(ItemType::AnyItem, Occurrence::ZeroOrOne)),
        )
        .register(Function::new(FN, "tail", fn_tail).param("arg", any_items()))
        .register(
            Function::new(FN, "insert-before", fn_insert_before)
                .param("target", any_items())
                .param("position", one(AtomicType::Integer))
                .param("inserts", any_items()),
        )
        .register(
            Function::new(FN, "remove", fn_remove)
                .param("target", any_items())
                .param("position", one(AtomicType::Integer)),
        )
        .register(Function::new(FN, "reverse", fn_reverse).param("arg", any_items()))
        .register(
            Function::new(FN, "subsequence", fn_subsequence)
                .param("source", any_items())
                .param("start", one(AtomicType::Double))
                .optional("length", one(AtomicType::Double)),
        )
        .register(Function::new(FN, "unordered", fn_unordered).param("arg", any_items()))
        .register(
            Function::new(FN, "distinct-values", fn_distinct_values)
                .param("arg", many(AtomicType::AnyAtomic))
                .optional("collation", opt_collation())
                .returns(many(AtomicType::AnyAtomic)),
        )
        .register(
            Function::new(FN, "index-of", fn_index_of)
                .param("seq", many(AtomicType::AnyAtomic))
                .param("search", one(AtomicType::AnyAtomic))
                .optional("collation", opt_collation())
                .returns(many(AtomicType::Integer)),
        )
        .register(
            Function::new(FN, "deep-equal", fn_deep_equal)
                .param("parameter1", any_items())
                .param("parameter2", any_items())
                .optional("collation", opt_collation())
                .returns(one(AtomicType::Boolean)),
        )
        .register(
            Function::new(FN, "zero-or-one", fn_zero_or_one)
                .param("arg", any_items())
                .returns(SequenceType::Of(ItemType::AnyItem, Occurrence::ZeroOrOne)),
        )
        .register(
            Function::new(FN, "one-or-more", fn_one_or_more)
                .param("arg", any_items())
                .returns(SequenceType::Of(ItemType::AnyItem, Occurrence::OneOrMore)),
        )
        .register(
            Function::new(FN, "exactly-one", fn_exactly_one)
                .param("arg", any_items())
                .returns(any_item()),
        )
        .register(
            Function::new(FN, "count", fn_count)
                .param("arg", any_items())
                .returns(one(AtomicType::Integer)),
        )
        .register(
            Function::new(FN, "sum", fn_sum)
                .param("arg", many(AtomicType::AnyAtomic))
                .optional("zero", opt(AtomicType::AnyAtomic))
                .returns(opt(AtomicType::AnyAtomic)),
        )
        .register(
            Function::new(FN, "avg", fn_avg)
                .param("arg", many(AtomicType::AnyAtomic))
                .returns(opt(AtomicType::AnyAtomic)),
        )
        .register(
            Function::new(FN, "min", fn_min)
                .param("arg", many(AtomicType::AnyAtomic))
                .optional("collation", opt_collation())
                .returns(opt(AtomicType::AnyAtomic)),
        )
        .register(
            Function::new(FN, "max", fn_max)
                .param("arg", many(AtomicType::AnyAtomic))
                .optional("collation", opt_collation())
                .returns(opt(AtomicType::AnyAtomic)),
        );
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::MetapathExpression;
    use crate::context::DynamicContext;

    fn eval(source: &str) -> Result<Sequence, MetapathError> {
        MetapathExpression::compile(source)?.evaluate(None, &DynamicContext::default())
    }

    fn integers(seq: &Sequence) -> Vec<i64> {
        seq.iter()
            .map(|item| match item {
                Item::Atomic(AtomicValue::Integer(i)) => i,
                other => panic!("Expected integer, found {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_sequence_manipulation() {
        assert_eq!(
            integers(&eval("insert-before((1, 2, 3), 2, (8, 9))").unwrap()),
            vec![1, 8, 9, 2, 3]
        );
        assert_eq!(integers(&eval("insert-before((1, 2), 10, 3)").unwrap()), vec![1, 2, 3]);
        assert_eq!(integers(&eval("remove((1, 2, 3), 2)").unwrap()), vec![1, 3]);
        assert_eq!(integers(&eval("remove((1, 2, 3), 7)").unwrap()), vec![1, 2, 3]);
        assert_eq!(integers(&eval("reverse(1 to 3)").unwrap()), vec![3, 2, 1]);
        assert_eq!(integers(&eval("subsequence(1 to 5, 2, 2)").unwrap()), vec![2, 3]);
        assert_eq!(integers(&eval("tail((1, 2, 3))").unwrap()), vec![2, 3]);
        assert_eq!(integers(&eval("head((4, 5))").unwrap()), vec![4]);
    }

    #[test]
    fn test_distinct_and_index_of() {
        assert_eq!(integers(&eval("distinct-values((1, 2, 1, 3, 2))").unwrap()), vec![1, 2, 3]);
        assert_eq!(
            eval("count(distinct-values((1, 1.0, 1e0)))").unwrap(),
            Sequence::from_integer(1)
        );
        assert_eq!(integers(&eval("index-of((10, 20, 30, 20), 20)").unwrap()), vec![2, 4]);
        assert!(eval("index-of(('a', 1), 'b')").unwrap().is_empty());
    }

    #[test]
    fn test_cardinality_checks() {
        assert_eq!(eval("exactly-one(1)").unwrap(), Sequence::from_integer(1));
        assert_eq!(eval("zero-or-one((1, 2))").unwrap_err().code(), codes::FORG0003);
        assert_eq!(eval("one-or-more(())").unwrap_err().code(), codes::FORG0004);
        assert_eq!(eval("exactly-one(())").unwrap_err().code(), codes::FORG0005);
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(eval("count(1 to 10)").unwrap(), Sequence::from_integer(10));
        assert_eq!(eval("sum(1 to 4)").unwrap(), Sequence::from_integer(10));
        assert_eq!(eval("sum(())").unwrap(), Sequence::from_integer(0));
        assert!(eval("sum((), ())").unwrap().is_empty());
        assert_eq!(eval("avg((1, 2))").unwrap(), Sequence::from_decimal(Decimal::new(15, 1)));
        assert_eq!(eval("max((1, 5, 3))").unwrap(), Sequence::from_integer(5));
        assert_eq!(eval("min(('b', 'a'))").unwrap(), Sequence::from_string("a"));
        assert_eq!(eval("max((1, 2.5))").unwrap(), Sequence::from_decimal(Decimal::new(25, 1)));
        assert_eq!(eval("max((1, 'a'))").unwrap_err().code(), codes::FORG0006);
        assert_eq!(eval("sum(('a', 'b'))").unwrap_err().code(), codes::FORG0006);
    }

    #[test]
    fn test_deep_equal() {
        assert_eq!(eval("deep-equal((1, 2), (1, 2))").unwrap(), Sequence::from_bool(true));
        assert_eq!(eval("deep-equal((1, 2), (2, 1))").unwrap(), Sequence::from_bool(false));
        assert_eq!(
            eval("deep-equal(map { 'a': [1, 2] }, map { 'a': [1, 2] })").unwrap(),
            Sequence::from_bool(true)
        );
        assert_eq!(
            eval("deep-equal(number('x'), number('y'))").unwrap(),
            Sequence::from_bool(true)
        );
    }
}
