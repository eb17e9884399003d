use super::{CallContext, FN, Function, FunctionLibrary, any_items, one};
use crate::error::MetapathError;
use crate::types::{AtomicType, Sequence};

fn fn_true(_args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_bool(true))
}

fn fn_false(_args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_bool(false))
}

fn fn_boolean(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_bool(args[0].effective_boolean_value()?))
}

fn fn_not(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_bool(!args[0].effective_boolean_value()?))
}

pub(super) fn register(library: &mut FunctionLibrary) {
    library
        .register(Function::new(FN, "true", fn_true).returns(one(AtomicType::Boolean)))
        .register(Function::new(FN, "false", fn_false).returns(one(AtomicType::Boolean)))
        .register(
            Function::new(FN, "boolean", fn_boolean)
                .param("arg", any_items())
                .returns(one(AtomicType::Boolean)),
        )
        .register(
            Function::new(FN, "not", fn_not)
                .param("arg", any_items())
                .returns(one(AtomicType::Boolean)),
        );
}
