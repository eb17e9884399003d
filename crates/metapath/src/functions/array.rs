//! The `array:` namespace. Positions are 1-based and out of range positions
//! fail with `FOAY0001`.
use super::hof::{call_predicate, invoke_function, sort_by_keys};
use super::{
    ARRAY, CallContext, Function, FunctionLibrary, any_items, arg, array_type, function_type,
    integer_arg, item_arg, many, one, opt, opt_string,
};
use crate::error::{MetapathError, codes};
use crate::types::{
    AtomicType, AtomicValue, Item, ItemType, Occurrence, Sequence, SequenceType, XdmArray,
};

fn array_arg(args: &[Sequence], index: usize) -> Result<XdmArray, MetapathError> {
    match item_arg(args, index)? {
        Item::Array(array) => Ok(array),
        other => Err(MetapathError::type_error(
            codes::XPTY0004,
            format!("Expected array(*), found {}", other.type_name()),
        )),
    }
}

fn position_arg(args: &[Sequence], index: usize) -> i64 {
    integer_arg(args, index).unwrap_or(0)
}

fn wrap(array: XdmArray) -> Sequence {
    Sequence::from_item(Item::Array(array))
}

fn fn_size(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_integer(array_arg(args, 0)?.size() as i64))
}

fn fn_get(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(array_arg(args, 0)?.get(position_arg(args, 1))?.clone())
}

fn fn_put(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let array = array_arg(args, 0)?;
    Ok(wrap(array.put(position_arg(args, 1), arg(args, 2))?))
}

fn fn_append(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(wrap(array_arg(args, 0)?.append(arg(args, 1))))
}

fn fn_subarray(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let array = array_arg(args, 0)?;
    let length = if args.len() > 2 { integer_arg(args, 2) } else { None };
    Ok(wrap(array.subarray(position_arg(args, 1), length)?))
}

fn fn_remove(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let array = array_arg(args, 0)?;
    let positions: Vec<i64> = arg(args, 1)
        .atomize()?
        .into_iter()
        .filter_map(|p| match p {
            AtomicValue::Integer(i) => Some(i),
            _ => None,
        })
        .collect();
    Ok(wrap(array.remove(&positions)?))
}

fn fn_insert_before(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let array = array_arg(args, 0)?;
    Ok(wrap(array.insert_before(position_arg(args, 1), arg(args, 2))?))
}

fn fn_head(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(array_arg(args, 0)?.head()?.clone())
}

fn fn_tail(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(wrap(array_arg(args, 0)?.tail()?))
}

fn fn_reverse(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(wrap(array_arg(args, 0)?.reverse()))
}

fn fn_join(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let arrays: Vec<XdmArray> = arg(args, 0)
        .iter()
        .filter_map(|item| match item {
            Item::Array(array) => Some(array),
            _ => None,
        })
        .collect();
    Ok(wrap(XdmArray::join(&arrays)))
}

fn flatten_into(item: Item, out: &mut Vec<Item>) {
    match item {
        Item::Array(array) => {
            for member in array.members() {
                for nested in member.iter() {
                    flatten_into(nested, out);
                }
            }
        }
        other => out.push(other),
    }
}

fn fn_flatten(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let mut out = Vec::new();
    for item in arg(args, 0).iter() {
        flatten_into(item, &mut out);
    }
    Ok(Sequence::from_items(out))
}

fn fn_for_each(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let array = array_arg(args, 0)?;
    let action = item_arg(args, 1)?;
    let mut members = Vec::with_capacity(array.size());
    for member in array.members() {
        members.push(invoke_function(&action, vec![member.clone()], ctx)?);
    }
    Ok(wrap(XdmArray::from_members(members)))
}

fn fn_filter(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let array = array_arg(args, 0)?;
    let predicate = item_arg(args, 1)?;
    let mut kept = Vec::new();
    for member in array.members() {
        if call_predicate(&predicate, vec![member.clone()], ctx)? {
            kept.push(member.clone());
        }
    }
    Ok(wrap(XdmArray::from_members(kept)))
}

fn fn_fold_left(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let array = array_arg(args, 0)?;
    let function = item_arg(args, 2)?;
    let mut acc = arg(args, 1);
    for member in array.members() {
        acc = invoke_function(&function, vec![acc, member.clone()], ctx)?;
    }
    Ok(acc)
}

fn fn_fold_right(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let array = array_arg(args, 0)?;
    let function = item_arg(args, 2)?;
    let mut acc = arg(args, 1);
    for member in array.members().iter().rev() {
        acc = invoke_function(&function, vec![member.clone(), acc], ctx)?;
    }
    Ok(acc)
}

fn fn_for_each_pair(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let (left, right) = (array_arg(args, 0)?, array_arg(args, 1)?);
    let action = item_arg(args, 2)?;
    let mut members = Vec::new();
    for (a, b) in left.members().iter().zip(right.members()) {
        members.push(invoke_function(&action, vec![a.clone(), b.clone()], ctx)?);
    }
    Ok(wrap(XdmArray::from_members(members)))
}

/// `array:sort`: orders members by their atomized value, or by the result of
/// the key function.
fn fn_sort(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    if let Some(collation) = opt_string(args, 1) {
        super::string::check_collation(&collation)?;
    }
    let array = array_arg(args, 0)?;
    let key = args.get(2).and_then(Sequence::first);
    let members = array.members().to_vec();
    let mut keys = Vec::with_capacity(members.len());
    for member in &members {
        let value = match &key {
            Some(function) => invoke_function(function, vec![member.clone()], ctx)?,
            None => member.clone(),
        };
        keys.push(value.atomize()?);
    }
    Ok(wrap(XdmArray::from_members(sort_by_keys(members, keys, ctx)?)))
}

pub(super) fn register(library: &mut FunctionLibrary) {
    let arrays = SequenceType::Of(ItemType::Array, Occurrence::ZeroOrMore);
    let position = || one(AtomicType::Integer);
    library
        .register(
            Function::new(ARRAY, "size", fn_size)
                .param("array", array_type())
                .returns(one(AtomicType::Integer)),
        )
        .register(
            Function::new(ARRAY, "get", fn_get)
                .param("array", array_type())
                .param("position", position()),
        )
        .register(
            Function::new(ARRAY, "put", fn_put)
                .param("array", array_type())
                .param("position", position())
                .param("member", any_items())
                .returns(array_type()),
        )
        .register(
            Function::new(ARRAY, "append", fn_append)
                .param("array", array_type())
                .param("appendage", any_items())
                .returns(array_type()),
        )
        .register(
            Function::new(ARRAY, "subarray", fn_subarray)
                .param("array", array_type())
                .param("start", position())
                .optional("length", position())
                .returns(array_type()),
        )
        .register(
            Function::new(ARRAY, "remove", fn_remove)
                .param("array", array_type())
                .param("positions", many(AtomicType::Integer))
                .returns(array_type()),
        )
        .register(
            Function::new(ARRAY, "insert-before", fn_insert_before)
                .param("array", array_type())
                .param("position", position())
                .param("member", any_items())
                .returns(array_type()),
        )
        .register(
            Function::new(ARRAY, "head", fn_head)
                .param("array", array_type()),
        )
        .register(
            Function::new(ARRAY, "tail", fn_tail)
                .param("array", array_type())
                .returns(array_type()),
        )
        .register(
            Function::new(ARRAY, "reverse", fn_reverse)
                .param("array", array_type())
                .returns(array_type()),
        )
        .register(
            Function::new(ARRAY, "join", fn_join)
                .param("arrays", arrays)
                .returns(array_type()),
        )
        .register(
            Function::new(ARRAY, "flatten", fn_flatten)
                .param("input", any_items()),
        )
        .register(
            Function::new(ARRAY, "for-each", fn_for_each)
                .param("array", array_type())
                .param("action", function_type(Some(1)))
                .returns(array_type()),
        )
        .register(
            Function::new(ARRAY, "filter", fn_filter)
                .param("array", array_type())
                .param("function", function_type(Some(1)))
                .returns(array_type()),
        )
        .register(
            Function::new(ARRAY, "fold-left", fn_fold_left)
                .param("array", array_type())
                .param("zero", any_items())
                .param("function", function_type(Some(2))),
        )
        .register(
            Function::new(ARRAY, "fold-right", fn_fold_right)
                .param("array", array_type())
                .param("zero", any_items())
                .param("function", function_type(Some(2))),
        )
        .register(
            Function::new(ARRAY, "for-each-pair", fn_for_each_pair)
                .param("array1", array_type())
                .param("array2", array_type())
                .param("function", function_type(Some(2)))
                .returns(array_type()),
        )
        .register(
            Function::new(ARRAY, "sort", fn_sort)
                .param("array", array_type())
                .optional("collation", opt(AtomicType::String))
                .optional("key", function_type(Some(1)))
                .returns(array_type()),
        );
}

#[cfg(test)]
mod tests {
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

    fn members(source: &str) -> Vec<Vec<i64>> {
        match eval(source).unwrap().first() {
            Some(Item::Array(array)) => array.members().iter().map(integers).collect(),
            other => panic!("Expected array, found {:?}", other),
        }
    }

    #[test]
    fn test_access_and_bounds() {
        assert_eq!(eval("array:size([1, (2, 3), ()])").unwrap(), Sequence::from_integer(3));
        assert_eq!(integers(&eval("array:get([1, (2, 3)], 2)").unwrap()), vec![2, 3]);
        assert_eq!(integers(&eval("array:head([5, 6])").unwrap()), vec![5]);
        let err = eval("array:get([1, 2], 3)").unwrap_err();
        assert_eq!(err.code(), codes::FOAY0001);
        let err = eval("array:head([])").unwrap_err();
        assert_eq!(err.code(), codes::FOAY0001);
    }

    #[test]
    fn test_modifications() {
        assert_eq!(members("array:put([1, 2], 1, 9)"), vec![vec![9], vec![2]]);
        assert_eq!(members("array:append([1], (2, 3))"), vec![vec![1], vec![2, 3]]);
        assert_eq!(members("array:subarray([1, 2, 3, 4], 2, 2)"), vec![vec![2], vec![3]]);
        assert_eq!(members("array:remove([1, 2, 3], (1, 3))"), vec![vec![2]]);
        assert_eq!(members("array:insert-before([1, 3], 2, 2)"), vec![vec![1], vec![2], vec![3]]);
        assert_eq!(members("array:tail([1, 2, 3])"), vec![vec![2], vec![3]]);
        assert_eq!(members("array:reverse([1, 2])"), vec![vec![2], vec![1]]);
        assert_eq!(members("array:join(([1], [2, 3]))"), vec![vec![1], vec![2], vec![3]]);
        let err = eval("array:subarray([1, 2], 2, -1)").unwrap_err();
        assert_eq!(err.code(), codes::FOAY0002);
    }

    #[test]
    fn test_flatten() {
        assert_eq!(
            integers(&eval("array:flatten((1, [2, [3, 4]], [], 5))").unwrap()),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn test_higher_order() {
        assert_eq!(
            members("array:for-each([1, 2], function($m) { $m * 10 })"),
            vec![vec![10], vec![20]]
        );
        assert_eq!(
            members("array:filter([1, 2, 3, 4], function($m) { $m mod 2 = 0 })"),
            vec![vec![2], vec![4]]
        );
        assert_eq!(
            eval("array:fold-left([1, 2, 3], 0, function($a, $m) { $a + $m })").unwrap(),
            Sequence::from_integer(6)
        );
        assert_eq!(
            integers(&eval("array:fold-right([1, 2, 3], (), function($m, $a) { ($a, $m) })").unwrap()),
            vec![3, 2, 1]
        );
        assert_eq!(
            members("array:for-each-pair([1, 2], [10, 20], function($a, $b) { $a + $b })"),
            vec![vec![11], vec![22]]
        );
        assert_eq!(members("array:sort([3, 1, 2])"), vec![vec![1], vec![2], vec![3]]);
        assert_eq!(
            members("array:sort([3, -4, 2], (), abs#1)"),
            vec![vec![2], vec![3], vec![-4]]
        );
    }
}
