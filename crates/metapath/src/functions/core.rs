use log::info;

use super::{
    CallContext, FN, Function, FunctionLibrary, Properties, any_items, arg, one, opt, opt_atomic,
    opt_string,
};
use crate::error::{MetapathError, codes};
use crate::types::{AtomicType, AtomicValue, Sequence, SequenceType};

fn fn_position(_args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let position = ctx.focus.position()?;
    Ok(Sequence::from_integer(position as i64))
}

fn fn_last(_args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_integer(ctx.focus.size() as i64))
}

/// `fn:error`: always fails with `FOER0000`. A caller supplied error QName is
/// carried in the message.
fn fn_error(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let code = match opt_atomic(args, 0) {
        Some(AtomicValue::QName(name)) => Some(name.to_string()),
        _ => None,
    };
    let description = opt_string(args, 1);
    let message = match (code, description) {
        (Some(code), Some(description)) => format!("{}: {}", code, description),
        (Some(code), None) => code,
        (None, Some(description)) => description,
        (None, None) => "An error was raised by fn:error".to_string(),
    };
    Err(MetapathError::function(codes::FOER0000, message))
}

fn fn_trace(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let value = arg(args, 0);
    let rendered: Vec<String> = value
        .iter()
        .map(|item| item.string_value().unwrap_or_else(|_| item.type_name().to_string()))
        .collect();
    match opt_string(args, 1) {
        Some(label) => info!("{}: ({})", label, rendered.join(", ")),
        None => info!("({})", rendered.join(", ")),
    }
    Ok(value)
}

pub(super) fn register(library: &mut FunctionLibrary) {
    library
        .register(
            Function::new(FN, "position", fn_position)
                .returns(one(AtomicType::Integer))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "last", fn_last)
                .returns(one(AtomicType::Integer))
                .properties(Properties::FOCUS),
        )
        .register(
            Function::new(FN, "error", fn_error)
                .optional("code", opt(AtomicType::QName))
                .optional("description", one(AtomicType::String))
                .optional("error-object", any_items())
                .returns(SequenceType::Empty)
                .properties(Properties::EFFECTFUL),
        )
        .register(
            Function::new(FN, "trace", fn_trace)
                .param("value", any_items())
                .optional("label", one(AtomicType::String))
                .properties(Properties::EFFECTFUL),
        );
}
