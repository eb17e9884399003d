//! The `map:` namespace. Every function returns a new map.
use super::hof::invoke_function;
use super::{
    CallContext, Function, FunctionLibrary, MAP, any_items, arg, function_type, item_arg, many,
    map_type, one, opt_atomic,
};
use crate::error::{MetapathError, codes};
use crate::types::{
    AtomicType, AtomicValue, Item, ItemType, Occurrence, Sequence, SequenceType, XdmArray, XdmMap,
    same_key,
};

fn map_arg(args: &[Sequence], index: usize) -> Result<XdmMap, MetapathError> {
    match item_arg(args, index)? {
        Item::Map(map) => Ok(map),
        other => Err(MetapathError::type_error(
            codes::XPTY0004,
            format!("Expected map(*), found {}", other.type_name()),
        )),
    }
}

fn key_arg(args: &[Sequence], index: usize) -> Result<AtomicValue, MetapathError> {
    opt_atomic(args, index)
        .ok_or_else(|| MetapathError::type_error(codes::XPTY0004, "A map key must not be empty"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Duplicates {
    UseFirst,
    UseLast,
    Combine,
    Reject,
}

fn duplicates_option(args: &[Sequence]) -> Result<Duplicates, MetapathError> {
    let Some(Item::Map(options)) = args.get(1).and_then(Sequence::first) else {
        return Ok(Duplicates::UseFirst);
    };
    let Some(value) = options.get(&AtomicValue::String("duplicates".into())) else {
        return Ok(Duplicates::UseFirst);
    };
    match value.atomize_optional()?.map(|v| v.to_string_value()).as_deref() {
        Some("use-first") | Some("use-any") => Ok(Duplicates::UseFirst),
        Some("use-last") => Ok(Duplicates::UseLast),
        Some("combine") => Ok(Duplicates::Combine),
        Some("reject") => Ok(Duplicates::Reject),
        other => Err(MetapathError::function(
            codes::FOJS0005,
            format!("Invalid value for the duplicates option: {:?}", other),
        )),
    }
}

fn fn_merge(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let duplicates = duplicates_option(args)?;
    let mut merged = XdmMap::new();
    for item in arg(args, 0).iter() {
        let Item::Map(map) = item else {
            return Err(MetapathError::type_error(
                codes::XPTY0004,
                format!("map:merge expects maps, found {}", item.type_name()),
            ));
        };
        for (key, value) in map.entries() {
            let existing = merged.get(key).cloned();
            merged = match (existing, duplicates) {
                (None, _) | (Some(_), Duplicates::UseLast) => {
                    merged.put(key.clone(), value.clone())
                }
                (Some(_), Duplicates::UseFirst) => continue,
                (Some(existing), Duplicates::Combine) => {
                    let combined = Sequence::concat([existing, value.clone()]);
                    merged.put(key.clone(), combined)
                }
                (Some(_), Duplicates::Reject) => {
                    return Err(MetapathError::function(
                        codes::FOJS0003,
                        format!("Duplicate key '{}' in map:merge", key.to_string_value()),
                    ));
                }
            };
        }
    }
    Ok(Sequence::from_item(Item::Map(merged)))
}

fn fn_size(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_integer(map_arg(args, 0)?.size() as i64))
}

fn fn_keys(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_atomics(map_arg(args, 0)?.keys().cloned()))
}

fn fn_contains(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let map = map_arg(args, 0)?;
    Ok(Sequence::from_bool(map.contains_key(&key_arg(args, 1)?)))
}

fn fn_get(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let map = map_arg(args, 0)?;
    Ok(map.get(&key_arg(args, 1)?).cloned().unwrap_or_default())
}

fn find_in(item: &Item, key: &AtomicValue, found: &mut Vec<Sequence>) {
    match item {
        Item::Map(map) => {
            for (k, value) in map.entries() {
                if same_key(k, key) {
                    found.push(value.clone());
                }
                for nested in value.iter() {
                    find_in(&nested, key, found);
                }
            }
        }
        Item::Array(array) => {
            for member in array.members() {
                for nested in member.iter() {
                    find_in(&nested, key, found);
                }
            }
        }
        _ => {}
    }
}

/// `map:find`: every value stored under `key` in any map reachable from
/// the input, collected into an array.
fn fn_find(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let key = key_arg(args, 1)?;
    let mut found = Vec::new();
    for item in arg(args, 0).iter() {
        find_in(&item, &key, &mut found);
    }
    Ok(Sequence::from_item(Item::Array(XdmArray::from_members(found))))
}

fn fn_put(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let map = map_arg(args, 0)?;
    Ok(Sequence::from_item(Item::Map(
        map.put(key_arg(args, 1)?, arg(args, 2)),
    )))
}

fn fn_entry(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_item(Item::Map(XdmMap::from_entries([(
        key_arg(args, 0)?,
        arg(args, 1),
    )]))))
}

fn fn_remove(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let map = map_arg(args, 0)?;
    let keys = arg(args, 1).atomize()?;
    Ok(Sequence::from_item(Item::Map(map.remove(keys.iter()))))
}

fn fn_for_each(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let map = map_arg(args, 0)?;
    let action = item_arg(args, 1)?;
    let mut parts = Vec::with_capacity(map.size());
    for (key, value) in map.entries() {
        parts.push(invoke_function(
            &action,
            vec![Sequence::from_atomic(key.clone()), value.clone()],
            ctx,
        )?);
    }
    Ok(Sequence::concat(parts))
}

pub(super) fn register(library: &mut FunctionLibrary) {
    let key = || one(AtomicType::AnyAtomic);
    let maps = SequenceType::Of(ItemType::Map, Occurrence::ZeroOrMore);
    library
        .register(
            Function::new(MAP, "merge", fn_merge)
                .param("maps", maps)
                .optional("options", map_type())
                .returns(map_type()),
        )
        .register(
            Function::new(MAP, "size", fn_size)
                .param("map", map_type())
                .returns(one(AtomicType::Integer)),
        )
        .register(
            Function::new(MAP, "keys", fn_keys)
                .param("map", map_type())
                .returns(many(AtomicType::AnyAtomic)),
        )
        .register(
            Function::new(MAP, "contains", fn_contains)
                .param("map", map_type())
                .param("key", key())
                .returns(one(AtomicType::Boolean)),
        )
        .register(
            Function::new(MAP, "get", fn_get)
                .param("map", map_type())
                .param("key", key()),
        )
        .register(
            Function::new(MAP, "find", fn_find)
                .param("input", any_items())
                .param("key", key())
                .returns(SequenceType::Of(ItemType::Array, Occurrence::One)),
        )
        .register(
            Function::new(MAP, "put", fn_put)
                .param("map", map_type())
                .param("key", key())
                .param("value", any_items())
                .returns(map_type()),
        )
        .register(
            Function::new(MAP, "entry", fn_entry)
                .param("key", key())
                .param("value", any_items())
                .returns(map_type()),
        )
        .register(
            Function::new(MAP, "remove", fn_remove)
                .param("map", map_type())
                .param("keys", many(AtomicType::AnyAtomic))
                .returns(map_type()),
        )
        .register(
            Function::new(MAP, "for-each", fn_for_each)
                .param("map", map_type())
                .param("action", function_type(Some(2))),
        );
}
