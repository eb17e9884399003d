use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use super::{
    CallContext, FN, Function, FunctionLibrary, Properties, integer_arg, one, opt, opt_atomic,
};
use crate::error::MetapathError;
use crate::operators::round_half_up;
use crate::types::{AtomicType, AtomicValue, Sequence, cast, double_to_decimal};

/// Applies `f` to the numeric argument, passing the empty sequence through.
fn with_number(
    args: &[Sequence],
    f: impl FnOnce(AtomicValue) -> Result<AtomicValue, MetapathError>,
) -> Result<Sequence, MetapathError> {
    match opt_atomic(args, 0) {
        Some(value) => Ok(Sequence::from_atomic(f(value)?)),
        None => Ok(Sequence::empty()),
    }
}

fn fn_abs(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    with_number(args, |value| {
        Ok(match value {
            AtomicValue::Integer(i) => {
                AtomicValue::Integer(i.checked_abs().ok_or_else(MetapathError::overflow)?)
            }
            AtomicValue::Decimal(d) => AtomicValue::Decimal(d.abs()),
            AtomicValue::Double(d) => AtomicValue::Double(d.abs()),
            other => other,
        })
    })
}

fn fn_ceiling(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    with_number(args, |value| {
        Ok(match value {
            AtomicValue::Decimal(d) => AtomicValue::Decimal(d.ceil()),
            AtomicValue::Double(d) => AtomicValue::Double(d.ceil()),
            other => other,
        })
    })
}

fn fn_floor(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    with_number(args, |value| {
        Ok(match value {
            AtomicValue::Decimal(d) => AtomicValue::Decimal(d.floor()),
            AtomicValue::Double(d) => AtomicValue::Double(d.floor()),
            other => other,
        })
    })
}

fn precision_arg(args: &[Sequence]) -> i32 {
    integer_arg(args, 1)
        .map(|p| p.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
        .unwrap_or(0)
}

fn fn_round(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let precision = precision_arg(args);
    with_number(args, |value| round_half_up(&value, precision))
}

fn half_even(value: Decimal, precision: i32) -> Result<Decimal, MetapathError> {
    if precision >= 0 {
        return Ok(value
            .round_dp_with_strategy(precision.unsigned_abs(), RoundingStrategy::MidpointNearestEven));
    }
    if precision.unsigned_abs() > 28 {
        return Ok(Decimal::ZERO);
    }
    let factor = Decimal::from_i128(10_i128.pow(precision.unsigned_abs()))
        .ok_or_else(MetapathError::overflow)?;
    value
        .checked_div(factor)
        .map(|d| d.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven))
        .and_then(|d| d.checked_mul(factor))
        .ok_or_else(MetapathError::overflow)
}

fn fn_round_half_to_even(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    let precision = precision_arg(args);
    with_number(args, |value| {
        Ok(match value {
            AtomicValue::Integer(i) if precision >= 0 => AtomicValue::Integer(i),
            AtomicValue::Integer(i) => {
                let rounded = half_even(Decimal::from(i), precision)?;
                AtomicValue::Integer(rounded.to_i64().ok_or_else(MetapathError::overflow)?)
            }
            AtomicValue::Decimal(d) => AtomicValue::Decimal(half_even(d, precision)?.normalize()),
            AtomicValue::Double(d) if !d.is_finite() || d == 0.0 => AtomicValue::Double(d),
            AtomicValue::Double(d) => match double_to_decimal(d) {
                Ok(exact) => match half_even(exact, precision) {
                    Ok(rounded) => AtomicValue::Double(rounded.to_f64().unwrap_or(d)),
                    Err(_) => AtomicValue::Double(d),
                },
                Err(_) => AtomicValue::Double(d),
            },
            other => other,
        })
    })
}

/// `fn:number`: the value cast to `xs:double`, `NaN` when that fails.
fn fn_number(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let value = if args.is_empty() {
        let mut values = Vec::new();
        ctx.context_item()?.atomize_into(&mut values)?;
        values.into_iter().next()
    } else {
        opt_atomic(args, 0)
    };
    let number = value
        .and_then(|v| cast::cast(&v, AtomicType::Double).ok())
        .and_then(|v| v.to_double())
        .unwrap_or(f64::NAN);
    Ok(Sequence::from_double(number))
}

pub(super) fn register(library: &mut FunctionLibrary) {
    let numeric = || opt(AtomicType::Numeric);
    library
        .register(
            Function::new(FN, "abs", fn_abs)
                .param("arg", numeric())
                .returns(numeric()),
        )
        .register(
            Function::new(FN, "ceiling", fn_ceiling)
                .param("arg", numeric())
                .returns(numeric()),
        )
        .register(
            Function::new(FN, "floor", fn_floor)
                .param("arg", numeric())
                .returns(numeric()),
        )
        .register(
            Function::new(FN, "round", fn_round)
                .param("arg", numeric())
                .optional("precision", one(AtomicType::Integer))
                .returns(numeric()),
        )
        .register(
            Function::new(FN, "round-half-to-even", fn_round_half_to_even)
                .param("arg", numeric())
                .optional("precision", one(AtomicType::Integer))
                .returns(numeric()),
        )
        .register(
            Function::new(FN, "number", fn_number)
                .optional("arg", opt(AtomicType::AnyAtomic))
                .returns(one(AtomicType::Double))
                .properties(Properties::FOCUS),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetapathExpression;
    use crate::context::DynamicContext;
    use crate::error::codes;

    fn eval(source: &str) -> Result<Sequence, MetapathError> {
        MetapathExpression::compile(source)?.evaluate(None, &DynamicContext::default())
    }

    #[test]
    fn test_type_preserving_functions() {
        assert_eq!(eval("abs(-3)").unwrap(), Sequence::from_integer(3));
        assert_eq!(eval("ceiling(1.2)").unwrap(), Sequence::from_decimal(Decimal::from(2)));
        assert_eq!(eval("floor(-1.5e0)").unwrap(), Sequence::from_double(-2.0));
        assert!(eval("abs(())").unwrap().is_empty());
        let err = eval("abs(-9223372036854775807 - 1)").unwrap_err();
        assert_eq!(err.code(), codes::FOAR0002);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(eval("round(2.5)").unwrap(), Sequence::from_decimal(Decimal::from(3)));
        assert_eq!(eval("round(-2.5)").unwrap(), Sequence::from_decimal(Decimal::from(-2)));
        assert_eq!(eval("round(1234, -2)").unwrap(), Sequence::from_integer(1200));
        assert_eq!(
            eval("round-half-to-even(2.5)").unwrap(),
            Sequence::from_decimal(Decimal::from(2))
        );
        assert_eq!(
            eval("round-half-to-even(3.567812e+3, 2)").unwrap(),
            Sequence::from_double(3567.81)
        );
        assert_eq!(eval("round-half-to-even(35, -1)").unwrap(), Sequence::from_integer(40));
    }

    #[test]
    fn test_rounding_overflow_is_an_error() {
        let max = "xs:decimal('79228162514264337593543950335')";
        assert_eq!(
            eval(&format!("round-half-to-even({}, 2)", max)).unwrap(),
            Sequence::from_decimal(Decimal::MAX)
        );
        let err = eval(&format!("round-half-to-even({}, -1)", max)).unwrap_err();
        assert_eq!(err.code(), codes::FOAR0002);
        assert_eq!(
            eval(&format!("round-half-to-even({}, -29)", max)).unwrap(),
            Sequence::from_decimal(Decimal::ZERO)
        );
    }

    #[test]
    fn test_number() {
        assert_eq!(eval("number('12')").unwrap(), Sequence::from_double(12.0));
        assert_eq!(eval("string(number('abc'))").unwrap(), Sequence::from_string("NaN"));
        assert_eq!(eval("string(number(()))").unwrap(), Sequence::from_string("NaN"));
    }
}
