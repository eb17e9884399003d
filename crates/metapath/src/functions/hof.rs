//! Dynamic invocation of function items and the higher-order functions.
use std::cmp::Ordering;

use super::{
    CallContext, FN, Function, FunctionLibrary, Properties, any_item, any_items, arg,
    array_type, function_type, integer_arg, item_arg, one, opt, opt_string,
};
use crate::engine;
use crate::error::{MetapathError, codes};
use crate::operators::sort_compare;
use crate::types::{
    AtomicType, AtomicValue, FunctionItem, Item, ItemType, Occurrence, Sequence, SequenceType, cast,
};

/// Calls a function, map or array item with evaluated arguments.
pub fn invoke_function(
    function: &Item,
    args: Vec<Sequence>,
    ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    match function {
        Item::Function(FunctionItem::Builtin { function, arity }) => {
            if args.len() != *arity {
                return Err(arity_mismatch(*arity, args.len()));
            }
            function.invoke(args, ctx)
        }
        Item::Function(FunctionItem::Inline { decl, captured }) => {
            engine::invoke_inline(decl, captured, args, ctx.dynamic)
        }
        Item::Function(FunctionItem::Partial { base, bound }) => {
            let expected = bound.iter().filter(|b| b.is_none()).count();
            if args.len() != expected {
                return Err(arity_mismatch(expected, args.len()));
            }
            let mut supplied = args.into_iter();
            let full = bound
                .iter()
                .map(|b| match b {
                    Some(value) => value.clone(),
                    None => supplied.next().unwrap_or_default(),
                })
                .collect();
            invoke_function(base, full, ctx)
        }
        Item::Map(map) => {
            let key = single_key(args)?;
            Ok(map.get(&key).cloned().unwrap_or_default())
        }
        Item::Array(array) => {
            let position = match single_key(args)? {
                AtomicValue::Integer(i) => i,
                key @ AtomicValue::UntypedAtomic(_) => {
                    match cast::cast(&key, AtomicType::Integer)? {
                        AtomicValue::Integer(i) => i,
                        _ => 0,
                    }
                }
                other => {
                    return Err(MetapathError::type_error(
                        codes::XPTY0004,
                        format!("Array index must be xs:integer, found {}", other.type_name()),
                    ));
                }
            };
            Ok(array.get(position)?.clone())
        }
        other => Err(MetapathError::type_error(
            codes::XPTY0004,
            format!("A {} cannot be called", other.type_name()),
        )),
    }
}

/// The arity of a callable item; maps and arrays take one argument.
pub(crate) fn item_arity(item: &Item) -> Option<usize> {
    match item {
        Item::Function(f) => Some(f.arity()),
        Item::Map(_) | Item::Array(_) => Some(1),
        _ => None,
    }
}

fn arity_mismatch(expected: usize, found: usize) -> MetapathError {
    MetapathError::type_error(
        codes::XPTY0004,
        format!(
            "Function of arity {} called with {} arguments",
            expected, found
        ),
    )
}

fn single_key(args: Vec<Sequence>) -> Result<AtomicValue, MetapathError> {
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(key), None) => key.atomize_optional()?.ok_or_else(|| {
            MetapathError::type_error(codes::XPTY0004, "A lookup key must not be empty")
        }),
        _ => Err(arity_mismatch(1, 2)),
    }
}

/// Calls `function` and requires a single boolean result, as `fn:filter`
/// and `array:filter` do.
pub(crate) fn call_predicate(
    function: &Item,
    args: Vec<Sequence>,
    ctx: &CallContext<'_>,
) -> Result<bool, MetapathError> {
    match invoke_function(function, args, ctx)?.get_first(true)? {
        Some(Item::Atomic(AtomicValue::Boolean(b))) => Ok(b),
        other => Err(MetapathError::type_error(
            codes::XPTY0004,
            format!(
                "Filter function must return a single xs:boolean, found {}",
                other.map_or("an empty sequence", |i| i.type_name())
            ),
        )),
    }
}

fn fn_for_each(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let action = item_arg(args, 1)?;
    let mut parts = Vec::new();
    for item in arg(args, 0).iter() {
        parts.push(invoke_function(&action, vec![Sequence::from_item(item)], ctx)?);
    }
    Ok(Sequence::concat(parts))
}

fn fn_filter(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let predicate = item_arg(args, 1)?;
    let mut kept = Vec::new();
    for item in arg(args, 0).iter() {
        if call_predicate(&predicate, vec![Sequence::from_item(item.clone())], ctx)? {
            kept.push(item);
        }
    }
    Ok(Sequence::from_items(kept))
}

fn fn_fold_left(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let function = item_arg(args, 2)?;
    let mut acc = arg(args, 1);
    for item in arg(args, 0).iter() {
        acc = invoke_function(&function, vec![acc, Sequence::from_item(item)], ctx)?;
    }
    Ok(acc)
}

fn fn_fold_right(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let function = item_arg(args, 2)?;
    let mut acc = arg(args, 1);
    for item in arg(args, 0).to_vec().into_iter().rev() {
        acc = invoke_function(&function, vec![Sequence::from_item(item), acc], ctx)?;
    }
    Ok(acc)
}

fn fn_for_each_pair(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let action = item_arg(args, 2)?;
    let (left, right) = (arg(args, 0), arg(args, 1));
    let mut parts = Vec::new();
    for (a, b) in left.iter().zip(right.iter()) {
        parts.push(invoke_function(
            &action,
            vec![Sequence::from_item(a), Sequence::from_item(b)],
            ctx,
        )?);
    }
    Ok(Sequence::concat(parts))
}

/// Lexicographic comparison of two sort keys.
pub(crate) fn compare_keys(
    left: &[AtomicValue],
    right: &[AtomicValue],
    ctx: &CallContext<'_>,
) -> Result<Ordering, MetapathError> {
    let implicit = ctx.dynamic.implicit_timezone();
    for (l, r) in left.iter().zip(right) {
        let ordering = sort_compare(l, r, implicit)?;
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }
    Ok(left.len().cmp(&right.len()))
}

/// Stable sort of `items` by precomputed keys, surfacing the first
/// comparison failure.
pub(crate) fn sort_by_keys<T>(
    items: Vec<T>,
    keys: Vec<Vec<AtomicValue>>,
    ctx: &CallContext<'_>,
) -> Result<Vec<T>, MetapathError> {
    let mut indexed: Vec<(Vec<AtomicValue>, T)> = keys.into_iter().zip(items).collect();
    let mut failure = None;
    indexed.sort_by(|(a, _), (b, _)| match compare_keys(a, b, ctx) {
        Ok(ordering) => ordering,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(indexed.into_iter().map(|(_, item)| item).collect()),
    }
}

fn fn_sort(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    if let Some(collation) = opt_string(args, 1) {
        super::string::check_collation(&collation)?;
    }
    let key = args.get(2).and_then(Sequence::first);
    let items = arg(args, 0).to_vec();
    let mut keys = Vec::with_capacity(items.len());
    for item in &items {
        let value = match &key {
            Some(function) => {
                invoke_function(function, vec![Sequence::from_item(item.clone())], ctx)?
            }
            None => Sequence::from_item(item.clone()),
        };
        keys.push(value.atomize()?);
    }
    Ok(Sequence::from_items(sort_by_keys(items, keys, ctx)?))
}

fn fn_apply(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let function = item_arg(args, 0)?;
    let Item::Array(array) = item_arg(args, 1)? else {
        return Err(MetapathError::type_error(
            codes::XPTY0004,
            "fn:apply requires an array of arguments",
        ));
    };
    if item_arity(&function) != Some(array.size()) {
        return Err(MetapathError::function(
            codes::FOAP0001,
            format!(
                "Function of arity {} applied to {} arguments",
                item_arity(&function).unwrap_or(0),
                array.size()
            ),
        ));
    }
    invoke_function(&function, array.members().to_vec(), ctx)
}

fn fn_function_lookup(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let Some(AtomicValue::QName(name)) = super::opt_atomic(args, 0) else {
        return Ok(Sequence::empty());
    };
    let arity = integer_arg(args, 1).unwrap_or(0);
    let Ok(arity) = usize::try_from(arity) else {
        return Ok(Sequence::empty());
    };
    let namespace = name.namespace.as_deref().unwrap_or(FN);
    Ok(Sequence::from_optional(
        ctx.dynamic
            .library()
            .lookup(namespace, &name.local, arity)
            .map(|function| {
                Item::Function(FunctionItem::Builtin {
                    function: function.clone(),
                    arity,
                })
            }),
    ))
}

fn fn_function_name(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(match args.first().and_then(Sequence::first) {
        Some(Item::Function(f)) => {
            Sequence::from_optional(f.name().map(|n| AtomicValue::QName(n).into()))
        }
        _ => Sequence::empty(),
    })
}

/// Non-function arguments yield the empty sequence rather than an error.
fn fn_function_arity(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(match args.first().and_then(Sequence::first) {
        Some(item) if item.is_function() => match item_arity(&item) {
            Some(arity) => Sequence::from_integer(arity as i64),
            None => Sequence::empty(),
        },
        _ => Sequence::empty(),
    })
}

pub(super) fn register(library: &mut FunctionLibrary) {
    library
        .register(
            Function::new(FN, "for-each", fn_for_each)
                .param("seq", any_items())
                .param("action", function_type(Some(1))),
        )
        .register(
            Function::new(FN, "filter", fn_filter)
                .param("seq", any_items())
                .param("f", function_type(Some(1))),
        )
        .register(
            Function::new(FN, "fold-left", fn_fold_left)
                .param("seq", any_items())
                .param("zero", any_items())
                .param("f", function_type(Some(2))),
        )
        .register(
            Function::new(FN, "fold-right", fn_fold_right)
                .param("seq", any_items())
                .param("zero", any_items())
                .param("f", function_type(Some(2))),
        )
        .register(
            Function::new(FN, "for-each-pair", fn_for_each_pair)
                .param("seq1", any_items())
                .param("seq2", any_items())
                .param("action", function_type(Some(2))),
        )
        .register(
            Function::new(FN, "sort", fn_sort)
                .param("input", any_items())
                .optional("collation", opt(AtomicType::String))
                .optional("key", function_type(Some(1))),
        )
        .register(
            Function::new(FN, "apply", fn_apply)
                .param("function", function_type(None))
                .param("array", array_type()),
        )
        .register(
            Function::new(FN, "function-lookup", fn_function_lookup)
                .param("name", one(AtomicType::QName))
                .param("arity", one(AtomicType::Integer))
                .returns(opt_function())
                .properties(Properties::CONTEXT),
        )
        .register(
            Function::new(FN, "function-name", fn_function_name)
                .param("func", any_item())
                .returns(opt(AtomicType::QName)),
        )
        .register(
            Function::new(FN, "function-arity", fn_function_arity)
                .param("func", any_items())
                .returns(opt(AtomicType::Integer)),
        );
}

fn opt_function() -> SequenceType {
    SequenceType::Of(ItemType::Function(None), Occurrence::ZeroOrOne)
}
