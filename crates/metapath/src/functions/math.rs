use super::{CallContext, Function, FunctionLibrary, Implementation, MATH, double_arg, one, opt};
use crate::error::MetapathError;
use crate::types::{AtomicType, Sequence};

fn unary(args: &[Sequence], f: fn(f64) -> f64) -> Result<Sequence, MetapathError> {
    Ok(match double_arg(args, 0) {
        Some(x) => Sequence::from_double(f(x)),
        None => Sequence::empty(),
    })
}

fn fn_pi(_args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_double(std::f64::consts::PI))
}

fn fn_exp(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    unary(args, f64::exp)
}

fn fn_exp10(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    unary(args, |x| 10f64.powf(x))
}

fn fn_log(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    unary(args, f64::ln)
}

fn fn_log10(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    unary(args, f64::log10)
}

fn fn_sqrt(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    unary(args, f64::sqrt)
}

fn fn_sin(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    unary(args, f64::sin)
}

fn fn_cos(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    unary(args, f64::cos)
}

fn fn_tan(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    unary(args, f64::tan)
}

fn fn_asin(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    unary(args, f64::asin)
}

fn fn_acos(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    unary(args, f64::acos)
}

fn fn_atan(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    unary(args, f64::atan)
}

fn fn_atan2(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let y = double_arg(args, 0).unwrap_or(f64::NAN);
    let x = double_arg(args, 1).unwrap_or(f64::NAN);
    Ok(Sequence::from_double(y.atan2(x)))
}

/// `math:pow`: `pow(x, 0)` is 1 for every `x`, including `NaN`.
fn fn_pow(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let Some(x) = double_arg(args, 0) else {
        return Ok(Sequence::empty());
    };
    let y = double_arg(args, 1).unwrap_or(f64::NAN);
    Ok(Sequence::from_double(if y == 0.0 { 1.0 } else { x.powf(y) }))
}

pub(super) fn register(library: &mut FunctionLibrary) {
    library.register(
        Function::new(MATH, "pi", fn_pi).returns(one(AtomicType::Double)),
    );
    let single_argument: [(&'static str, Implementation); 11] = [
        ("exp", fn_exp),
        ("exp10", fn_exp10),
        ("log", fn_log),
        ("log10", fn_log10),
        ("sqrt", fn_sqrt),
        ("sin", fn_sin),
        ("cos", fn_cos),
        ("tan", fn_tan),
        ("asin", fn_asin),
        ("acos", fn_acos),
        ("atan", fn_atan),
    ];
    for (name, implementation) in single_argument {
        library.register(
            Function::new(MATH, name, implementation)
                .param("arg", opt(AtomicType::Double))
                .returns(opt(AtomicType::Double)),
        );
    }
    library
        .register(
            Function::new(MATH, "pow", fn_pow)
                .param("x", opt(AtomicType::Double))
                .param("y", one(AtomicType::Numeric))
                .returns(opt(AtomicType::Double)),
        )
        .register(
            Function::new(MATH, "atan2", fn_atan2)
                .param("y", one(AtomicType::Double))
                .param("x", one(AtomicType::Double))
                .returns(one(AtomicType::Double)),
        );
}
