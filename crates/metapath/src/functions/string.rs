use super::{
    CallContext, FN, Function, FunctionLibrary, Properties, double_arg, many, one, opt,
    opt_string, string_arg,
};
use crate::error::{MetapathError, codes};
use crate::types::{
    AtomicType, AtomicValue, ItemType, Occurrence, Sequence, SequenceType, collapse_whitespace,
};

/// The only collation supported: comparison by Unicode codepoint.
pub const CODEPOINT_COLLATION: &str = "http://www.w3.org/2005/xpath-functions/collation/codepoint";

pub(super) fn check_collation(uri: &str) -> Result<(), MetapathError> {
    if uri == CODEPOINT_COLLATION {
        Ok(())
    } else {
        Err(MetapathError::function(
            codes::FOCH0002,
            format!("Unsupported collation '{}'", uri),
        ))
    }
}

fn collation_arg(args: &[Sequence], index: usize) -> Result<(), MetapathError> {
    match opt_string(args, index) {
        Some(uri) => check_collation(&uri),
        None => Ok(()),
    }
}

fn fn_string(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let value = match args.first() {
        Some(arg) => match arg.first() {
            Some(item) => item.string_value()?,
            None => String::new(),
        },
        None => ctx.context_item()?.string_value()?,
    };
    Ok(Sequence::from_string(value))
}

/// The string argument at `index`, or the string value of the context item
/// when the argument was omitted.
fn string_or_context(
    args: &[Sequence],
    index: usize,
    ctx: &CallContext<'_>,
) -> Result<String, MetapathError> {
    if args.len() > index {
        Ok(string_arg(args, index))
    } else {
        ctx.context_item()?.string_value()
    }
}

fn fn_string_length(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let value = string_or_context(args, 0, ctx)?;
    Ok(Sequence::from_integer(value.chars().count() as i64))
}

fn fn_normalize_space(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let value = string_or_context(args, 0, ctx)?;
    Ok(Sequence::from_string(collapse_whitespace(&value)))
}

fn fn_concat(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let mut out = String::new();
    for index in 0..args.len() {
        out.push_str(&string_arg(args, index));
    }
    Ok(Sequence::from_string(out))
}

fn fn_string_join(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let separator = string_arg(args, 1);
    let parts: Vec<String> = args[0]
        .iter()
        .filter_map(|item| item.as_atomic().map(AtomicValue::to_string_value))
        .collect();
    Ok(Sequence::from_string(parts.join(&separator)))
}

/// XPath rounding: half values round towards positive infinity.
fn xpath_round(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Characters at positions `p` with `round(start) <= p < round(start) +
/// round(length)`. Out of range or `NaN` bounds select nothing rather than
/// fail.
fn fn_substring(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let source = string_arg(args, 0);
    let start = xpath_round(double_arg(args, 1).unwrap_or(f64::NAN));
    let end = if args.len() > 2 {
        start + xpath_round(double_arg(args, 2).unwrap_or(f64::NAN))
    } else {
        f64::INFINITY
    };
    let result: String = source
        .chars()
        .enumerate()
        .filter(|(index, _)| {
            let position = (*index + 1) as f64;
            position >= start && position < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(Sequence::from_string(result))
}

fn fn_substring_before(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    collation_arg(args, 2)?;
    let (source, search) = (string_arg(args, 0), string_arg(args, 1));
    let result = match source.find(&search) {
        Some(offset) if !search.is_empty() => &source[..offset],
        _ => "",
    };
    Ok(Sequence::from_string(result))
}

fn fn_substring_after(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    collation_arg(args, 2)?;
    let (source, search) = (string_arg(args, 0), string_arg(args, 1));
    let result = match source.find(&search) {
        Some(offset) => &source[offset + search.len()..],
        None => "",
    };
    Ok(Sequence::from_string(result))
}

fn fn_contains(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    collation_arg(args, 2)?;
    Ok(Sequence::from_bool(
        string_arg(args, 0).contains(&string_arg(args, 1)),
    ))
}

fn fn_starts_with(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    collation_arg(args, 2)?;
    Ok(Sequence::from_bool(
        string_arg(args, 0).starts_with(&string_arg(args, 1)),
    ))
}

fn fn_ends_with(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    collation_arg(args, 2)?;
    Ok(Sequence::from_bool(
        string_arg(args, 0).ends_with(&string_arg(args, 1)),
    ))
}

fn fn_upper_case(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_string(string_arg(args, 0).to_uppercase()))
}

fn fn_lower_case(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_string(string_arg(args, 0).to_lowercase()))
}

fn fn_translate(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let source = string_arg(args, 0);
    let from: Vec<char> = string_arg(args, 1).chars().collect();
    let to: Vec<char> = string_arg(args, 2).chars().collect();
    let result: String = source
        .chars()
        .filter_map(|c| match from.iter().position(|f| *f == c) {
            Some(index) => to.get(index).copied(),
            None => Some(c),
        })
        .collect();
    Ok(Sequence::from_string(result))
}

fn fn_codepoints_to_string(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    let mut out = String::new();
    for item in args[0].iter() {
        let Some(AtomicValue::Integer(cp)) = item.as_atomic() else {
            continue;
        };
        let c = u32::try_from(*cp).ok().and_then(char::from_u32).ok_or_else(|| {
            MetapathError::function(
                codes::FOCH0001,
                format!("{} is not a valid XML character", cp),
            )
        })?;
        out.push(c);
    }
    Ok(Sequence::from_string(out))
}

fn fn_string_to_codepoints(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    let Some(value) = opt_string(args, 0) else {
        return Ok(Sequence::empty());
    };
    Ok(Sequence::from_atomics(
        value.chars().map(|c| AtomicValue::Integer(c as i64)),
    ))
}

fn fn_compare(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    collation_arg(args, 2)?;
    let (Some(a), Some(b)) = (opt_string(args, 0), opt_string(args, 1)) else {
        return Ok(Sequence::empty());
    };
    Ok(Sequence::from_integer(a.cmp(&b) as i64))
}

fn fn_codepoint_equal(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    let (Some(a), Some(b)) = (opt_string(args, 0), opt_string(args, 1)) else {
        return Ok(Sequence::empty());
    };
    Ok(Sequence::from_bool(a == b))
}

fn fn_contains_token(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    collation_arg(args, 2)?;
    let token = string_arg(args, 1);
    let token = token.trim();
    if token.is_empty() {
        return Ok(Sequence::from_bool(false));
    }
    let found = args[0].iter().any(|item| {
        item.as_atomic()
            .map(AtomicValue::to_string_value)
            .is_some_and(|s| s.split_whitespace().any(|t| t == token))
    });
    Ok(Sequence::from_bool(found))
}

fn fn_default_collation(
    _args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_string(CODEPOINT_COLLATION))
}

pub(super) fn register(library: &mut FunctionLibrary) {
    let opt_string_type = || opt(AtomicType::String);
    library
        .register(
            Function::new(FN, "string", fn_string)
                .optional("arg", SequenceType::Of(ItemType::AnyItem, Occurrence::ZeroOrOne))
                .returns(one(AtomicType::String))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "string-length", fn_string_length)
                .optional("arg", opt_string_type())
                .returns(one(AtomicType::Integer))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "normalize-space", fn_normalize_space)
                .optional("arg", opt_string_type())
                .returns(one(AtomicType::String))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "concat", fn_concat)
                .param("arg1", opt(AtomicType::AnyAtomic))
                .param("arg2", opt(AtomicType::AnyAtomic))
                .variadic()
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "string-join", fn_string_join)
                .param("arg", many(AtomicType::AnyAtomic))
                .optional("separator", one(AtomicType::String))
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "substring", fn_substring)
                .param("source", opt_string_type())
                .param("start", one(AtomicType::Double))
                .optional("length", one(AtomicType::Double))
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "substring-before", fn_substring_before)
                .param("arg1", opt_string_type())
                .param("arg2", opt_string_type())
                .optional("collation", one(AtomicType::String))
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "substring-after", fn_substring_after)
                .param("arg1", opt_string_type())
                .param("arg2", opt_string_type())
                .optional("collation", one(AtomicType::String))
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "contains", fn_contains)
                .param("arg1", opt_string_type())
                .param("arg2", opt_string_type())
                .optional("collation", one(AtomicType::String))
                .returns(one(AtomicType::Boolean)),
        )
        .register(
            Function::new(FN, "starts-with", fn_starts_with)
                .param("arg1", opt_string_type())
                .param("arg2", opt_string_type())
                .optional("collation", one(AtomicType::String))
                .returns(one(AtomicType::Boolean)),
        )
        .register(
            Function::new(FN, "ends-with", fn_ends_with)
                .param("arg1", opt_string_type())
                .param("arg2", opt_string_type())
                .optional("collation", one(AtomicType::String))
                .returns(one(AtomicType::Boolean)),
        )
        .register(
            Function::new(FN, "upper-case", fn_upper_case)
                .param("arg", opt_string_type())
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "lower-case", fn_lower_case)
                .param("arg", opt_string_type())
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "translate", fn_translate)
                .param("arg", opt_string_type())
                .param("map", one(AtomicType::String))
                .param("trans", one(AtomicType::String))
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "codepoints-to-string", fn_codepoints_to_string)
                .param("arg", many(AtomicType::Integer))
                .returns(one(AtomicType::String)),
        )
        .register(
            Function::new(FN, "string-to-codepoints", fn_string_to_codepoints)
                .param("arg", opt_string_type())
                .returns(many(AtomicType::Integer)),
        )
        .register(
            Function::new(FN, "compare", fn_compare)
                .param("comparand1", opt_string_type())
                .param("comparand2", opt_string_type())
                .optional("collation", one(AtomicType::String))
                .returns(opt(AtomicType::Integer)),
        )
        .register(
            Function::new(FN, "codepoint-equal", fn_codepoint_equal)
                .param("comparand1", opt_string_type())
                .param("comparand2", opt_string_type())
                .returns(opt(AtomicType::Boolean)),
        )
        .register(
            Function::new(FN, "contains-token", fn_contains_token)
                .param("input", many(AtomicType::String))
                .param("token", one(AtomicType::String))
                .optional("collation", one(AtomicType::String))
                .returns(one(AtomicType::Boolean)),
        )
        .register(
            Function::new(FN, "default-collation", fn_default_collation)
                .returns(one(AtomicType::String)),
        );
}
