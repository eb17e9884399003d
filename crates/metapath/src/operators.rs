//! Operator semantics on atomic values and node sets.
//!
//! Arithmetic follows the numeric promotion lattice (integer, decimal,
//! double) and the date/duration arithmetic tables. Comparisons implement
//! value comparison, the existential general comparison and node identity
//! and order comparisons.
use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{FixedOffset, NaiveDateTime, TimeDelta};
use metaschema_model::NodeRef;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::error::{MetapathError, codes};
use crate::expr::{ArithmeticOp, ComparisonOp, NodeComparisonOp, SetOp};
use crate::types::temporal::add_duration;
use crate::types::{
    AtomicType, AtomicValue, DateTimeValue, DateValue, DurationValue, Sequence, TimeValue, cast,
    double_to_decimal,
};

enum Numbers {
    Integer(i64, i64),
    Decimal(Decimal, Decimal),
    Double(f64, f64),
}

/// Promotes two numeric operands to their common type.
fn promote(left: &AtomicValue, right: &AtomicValue) -> Option<Numbers> {
    use AtomicValue as V;
    match (left, right) {
        (V::Integer(a), V::Integer(b)) => Some(Numbers::Integer(*a, *b)),
        (V::Double(_), _) | (_, V::Double(_)) => {
            Some(Numbers::Double(left.to_double()?, right.to_double()?))
        }
        (V::Integer(_) | V::Decimal(_), V::Integer(_) | V::Decimal(_)) => {
            Some(Numbers::Decimal(decimal(left)?, decimal(right)?))
        }
        _ => None,
    }
}

fn decimal(value: &AtomicValue) -> Option<Decimal> {
    match value {
        AtomicValue::Integer(i) => Some(Decimal::from(*i)),
        AtomicValue::Decimal(d) => Some(*d),
        _ => None,
    }
}

/// Untyped operands of arithmetic are cast to `xs:double`.
fn numeric_operand(value: &AtomicValue) -> Result<AtomicValue, MetapathError> {
    if value.is_untyped() {
        cast::cast(value, AtomicType::Double)
    } else {
        Ok(value.clone())
    }
}

pub fn arithmetic(
    op: ArithmeticOp,
    left: &AtomicValue,
    right: &AtomicValue,
    implicit: FixedOffset,
) -> Result<AtomicValue, MetapathError> {
    let left = numeric_operand(left)?;
    let right = numeric_operand(right)?;
    if let Some(numbers) = promote(&left, &right) {
        return numeric(op, numbers);
    }
    temporal(op, &left, &right, implicit).ok_or_else(|| {
        MetapathError::type_error(
            codes::XPTY0004,
            format!(
                "Operator '{}' is not defined for {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ),
        )
    })?
}

fn numeric(op: ArithmeticOp, numbers: Numbers) -> Result<AtomicValue, MetapathError> {
    match numbers {
        Numbers::Integer(a, b) => integer_op(op, a, b),
        Numbers::Decimal(a, b) => decimal_op(op, a, b),
        Numbers::Double(a, b) => double_op(op, a, b),
    }
}

fn integer_op(op: ArithmeticOp, a: i64, b: i64) -> Result<AtomicValue, MetapathError> {
    let result = match op {
        ArithmeticOp::Add => a.checked_add(b),
        ArithmeticOp::Subtract => a.checked_sub(b),
        ArithmeticOp::Multiply => a.checked_mul(b),
        ArithmeticOp::Divide => {
            return decimal_op(op, Decimal::from(a), Decimal::from(b));
        }
        ArithmeticOp::IntegerDivide | ArithmeticOp::Modulo if b == 0 => {
            return Err(MetapathError::division_by_zero());
        }
        ArithmeticOp::IntegerDivide => a.checked_div(b),
        ArithmeticOp::Modulo => a.checked_rem(b),
    };
    result.map(AtomicValue::Integer).ok_or_else(MetapathError::overflow)
}

fn decimal_op(op: ArithmeticOp, a: Decimal, b: Decimal) -> Result<AtomicValue, MetapathError> {
    if b.is_zero()
        && matches!(
            op,
            ArithmeticOp::Divide | ArithmeticOp::IntegerDivide | ArithmeticOp::Modulo
        )
    {
        return Err(MetapathError::division_by_zero());
    }
    let result = match op {
        ArithmeticOp::Add => a.checked_add(b),
        ArithmeticOp::Subtract => a.checked_sub(b),
        ArithmeticOp::Multiply => a.checked_mul(b),
        ArithmeticOp::Divide => a.checked_div(b),
        ArithmeticOp::IntegerDivide => {
            let quotient = a.checked_div(b).ok_or_else(MetapathError::overflow)?;
            return quotient
                .trunc()
                .to_i64()
                .map(AtomicValue::Integer)
                .ok_or_else(MetapathError::overflow);
        }
        ArithmeticOp::Modulo => a.checked_rem(b),
    };
    result
        .map(|d| AtomicValue::Decimal(d.normalize()))
        .ok_or_else(MetapathError::overflow)
}

fn double_op(op: ArithmeticOp, a: f64, b: f64) -> Result<AtomicValue, MetapathError> {
    let result = match op {
        ArithmeticOp::Add => a + b,
        ArithmeticOp::Subtract => a - b,
        ArithmeticOp::Multiply => a * b,
        ArithmeticOp::Divide => a / b,
        ArithmeticOp::Modulo => a % b,
        ArithmeticOp::IntegerDivide => {
            if b == 0.0 {
                return Err(MetapathError::division_by_zero());
            }
            if a.is_nan() || b.is_nan() || a.is_infinite() {
                return Err(MetapathError::arithmetic(
                    codes::FOAR0002,
                    "Integer division of NaN or infinity",
                ));
            }
            let quotient = (a / b).trunc();
            if quotient < i64::MIN as f64 || quotient > i64::MAX as f64 {
                return Err(MetapathError::overflow());
            }
            return Ok(AtomicValue::Integer(quotient as i64));
        }
    };
    Ok(AtomicValue::Double(result))
}

fn datetime_error() -> MetapathError {
    MetapathError::arithmetic(codes::FODT0001, "Date/time arithmetic overflow")
}

/// Date, time and duration arithmetic. `None` when the operator is not
/// defined for the operand types.
fn temporal(
    op: ArithmeticOp,
    left: &AtomicValue,
    right: &AtomicValue,
    implicit: FixedOffset,
) -> Option<Result<AtomicValue, MetapathError>> {
    use AtomicValue as V;
    use ArithmeticOp as Op;

    let result = match (left, op, right) {
        // Points in time shifted by a duration.
        (V::DateTime(dt), Op::Add, V::YearMonthDuration(d) | V::DayTimeDuration(d))
        | (V::YearMonthDuration(d) | V::DayTimeDuration(d), Op::Add, V::DateTime(dt)) => {
            shift(dt.datetime, d, false).map(|datetime| {
                V::DateTime(DateTimeValue {
                    datetime,
                    timezone: dt.timezone,
                })
            })
        }
        (V::DateTime(dt), Op::Subtract, V::YearMonthDuration(d) | V::DayTimeDuration(d)) => {
            shift(dt.datetime, d, true).map(|datetime| {
                V::DateTime(DateTimeValue {
                    datetime,
                    timezone: dt.timezone,
                })
            })
        }
        (V::Date(date), Op::Add, V::YearMonthDuration(d) | V::DayTimeDuration(d))
        | (V::YearMonthDuration(d) | V::DayTimeDuration(d), Op::Add, V::Date(date)) => {
            shift(date.to_date_time().datetime, d, false).map(|dt| {
                V::Date(DateValue {
                    date: dt.date(),
                    timezone: date.timezone,
                })
            })
        }
        (V::Date(date), Op::Subtract, V::YearMonthDuration(d) | V::DayTimeDuration(d)) => {
            shift(date.to_date_time().datetime, d, true).map(|dt| {
                V::Date(DateValue {
                    date: dt.date(),
                    timezone: date.timezone,
                })
            })
        }
        (V::Time(t), Op::Add | Op::Subtract, V::DayTimeDuration(d)) => {
            d.to_time_delta().map(|delta| {
                let delta = if op == Op::Subtract { -delta } else { delta };
                V::Time(TimeValue {
                    time: t.time.overflowing_add_signed(delta).0,
                    timezone: t.timezone,
                })
            })
        }

        // Differences between points in time.
        (V::DateTime(a), Op::Subtract, V::DateTime(b)) => {
            difference(a.to_utc(implicit), b.to_utc(implicit))
        }
        (V::Date(a), Op::Subtract, V::Date(b)) => difference(
            a.to_date_time().to_utc(implicit),
            b.to_date_time().to_utc(implicit),
        ),
        (V::Time(a), Op::Subtract, V::Time(b)) => difference(
            a.to_date_time().to_utc(implicit),
            b.to_date_time().to_utc(implicit),
        ),

        // Duration arithmetic.
        (V::YearMonthDuration(a), Op::Add, V::YearMonthDuration(b)) => a
            .months
            .checked_add(b.months)
            .map(|m| V::YearMonthDuration(DurationValue::from_months(m)))
            .ok_or_else(datetime_error),
        (V::YearMonthDuration(a), Op::Subtract, V::YearMonthDuration(b)) => a
            .months
            .checked_sub(b.months)
            .map(|m| V::YearMonthDuration(DurationValue::from_months(m)))
            .ok_or_else(datetime_error),
        (V::DayTimeDuration(a), Op::Add, V::DayTimeDuration(b)) => a
            .seconds
            .checked_add(b.seconds)
            .map(|s| V::DayTimeDuration(DurationValue::from_seconds(s)))
            .ok_or_else(datetime_error),
        (V::DayTimeDuration(a), Op::Subtract, V::DayTimeDuration(b)) => a
            .seconds
            .checked_sub(b.seconds)
            .map(|s| V::DayTimeDuration(DurationValue::from_seconds(s)))
            .ok_or_else(datetime_error),
        (V::YearMonthDuration(a), Op::Divide, V::YearMonthDuration(b)) => {
            decimal_op(Op::Divide, Decimal::from(a.months), Decimal::from(b.months))
        }
        (V::DayTimeDuration(a), Op::Divide, V::DayTimeDuration(b)) => {
            decimal_op(Op::Divide, a.seconds, b.seconds)
        }
        (V::YearMonthDuration(_) | V::DayTimeDuration(_), Op::Multiply | Op::Divide, n)
            if n.is_numeric() =>
        {
            scale(left, op, n)
        }
        (n, Op::Multiply, V::YearMonthDuration(_) | V::DayTimeDuration(_)) if n.is_numeric() => {
            scale(right, op, n)
        }
        _ => return None,
    };
    Some(result)
}

fn shift(
    datetime: NaiveDateTime,
    duration: &DurationValue,
    subtract: bool,
) -> Result<NaiveDateTime, MetapathError> {
    if subtract {
        add_duration(datetime, &duration.negate())
    } else {
        add_duration(datetime, duration)
    }
}

fn difference(a: NaiveDateTime, b: NaiveDateTime) -> Result<AtomicValue, MetapathError> {
    let delta: TimeDelta = a.signed_duration_since(b);
    DurationValue::from_time_delta(delta).map(AtomicValue::DayTimeDuration)
}

/// Multiplies or divides a duration by a number.
fn scale(
    duration: &AtomicValue,
    op: ArithmeticOp,
    factor: &AtomicValue,
) -> Result<AtomicValue, MetapathError> {
    let factor = factor.to_double().unwrap_or(f64::NAN);
    if factor.is_nan() {
        return Err(MetapathError::arithmetic(
            codes::FODT0002,
            "Cannot scale a duration by NaN",
        ));
    }
    if op == ArithmeticOp::Divide && factor == 0.0 {
        return Err(MetapathError::arithmetic(
            codes::FODT0002,
            "Cannot divide a duration by zero",
        ));
    }
    let factor = if op == ArithmeticOp::Divide {
        1.0 / factor
    } else {
        factor
    };
    if !factor.is_finite() {
        return Err(MetapathError::arithmetic(codes::FODT0002, "Duration overflow"));
    }
    match duration {
        AtomicValue::YearMonthDuration(d) => {
            let months = (d.months as f64 * factor + 0.5).floor();
            if months.abs() > i64::MAX as f64 {
                return Err(MetapathError::arithmetic(codes::FODT0002, "Duration overflow"));
            }
            Ok(AtomicValue::YearMonthDuration(DurationValue::from_months(
                months as i64,
            )))
        }
        AtomicValue::DayTimeDuration(d) => {
            let factor = double_to_decimal(factor)?;
            let seconds = d
                .seconds
                .checked_mul(factor)
                .ok_or_else(|| MetapathError::arithmetic(codes::FODT0002, "Duration overflow"))?;
            Ok(AtomicValue::DayTimeDuration(DurationValue::from_seconds(
                seconds.round_dp(9).normalize(),
            )))
        }
        other => Err(MetapathError::type_error(
            codes::XPTY0004,
            format!("Cannot scale a value of type {}", other.type_name()),
        )),
    }
}

pub fn negate(value: &AtomicValue) -> Result<AtomicValue, MetapathError> {
    let value = numeric_operand(value)?;
    match value {
        AtomicValue::Integer(i) => i
            .checked_neg()
            .map(AtomicValue::Integer)
            .ok_or_else(MetapathError::overflow),
        AtomicValue::Decimal(d) => Ok(AtomicValue::Decimal(-d)),
        AtomicValue::Double(d) => Ok(AtomicValue::Double(-d)),
        AtomicValue::DayTimeDuration(d) => Ok(AtomicValue::DayTimeDuration(d.negate())),
        AtomicValue::YearMonthDuration(d) => Ok(AtomicValue::YearMonthDuration(d.negate())),
        other => Err(MetapathError::type_error(
            codes::XPTY0004,
            format!("Unary minus is not defined for {}", other.type_name()),
        )),
    }
}

fn is_string_like(value: &AtomicValue) -> bool {
    value.as_str().is_some()
}

fn incomparable(left: &AtomicValue, right: &AtomicValue) -> MetapathError {
    MetapathError::type_error(
        codes::XPTY0004,
        format!(
            "Values of type {} and {} cannot be compared",
            left.type_name(),
            right.type_name()
        ),
    )
}

/// Orders two atomic values. `Ok(None)` means the values are unordered
/// (a NaN operand); incomparable types are an `XPTY0004` error. With
/// `equality_only` the durations and QNames that only support `eq`/`ne`
/// compare as well.
fn order(
    left: &AtomicValue,
    right: &AtomicValue,
    implicit: FixedOffset,
    equality_only: bool,
) -> Result<Option<Ordering>, MetapathError> {
    use AtomicValue as V;
    if let Some(numbers) = promote(left, right) {
        return Ok(match numbers {
            Numbers::Integer(a, b) => Some(a.cmp(&b)),
            Numbers::Decimal(a, b) => Some(a.cmp(&b)),
            Numbers::Double(a, b) => a.partial_cmp(&b),
        });
    }
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        return Ok(Some(a.cmp(b)));
    }
    let ordering = match (left, right) {
        (V::Boolean(a), V::Boolean(b)) => a.cmp(b),
        (V::Date(a), V::Date(b)) => a.compare(b, implicit),
        (V::DateTime(a), V::DateTime(b)) => a.compare(b, implicit),
        (V::Time(a), V::Time(b)) => a.compare(b, implicit),
        (V::YearMonthDuration(a), V::YearMonthDuration(b)) => a.months.cmp(&b.months),
        (V::DayTimeDuration(a), V::DayTimeDuration(b)) => a.seconds.cmp(&b.seconds),
        (V::Base64Binary(a), V::Base64Binary(b)) => a.cmp(b),
        (
            V::Duration(a) | V::YearMonthDuration(a) | V::DayTimeDuration(a),
            V::Duration(b) | V::YearMonthDuration(b) | V::DayTimeDuration(b),
        ) if equality_only => {
            if a.months == b.months && a.seconds == b.seconds {
                Ordering::Equal
            } else {
                Ordering::Less
            }
        }
        (V::QName(a), V::QName(b)) if equality_only => {
            if a.same_name(b) {
                Ordering::Equal
            } else {
                Ordering::Less
            }
        }
        _ => return Err(incomparable(left, right)),
    };
    Ok(Some(ordering))
}

fn apply(op: ComparisonOp, ordering: Option<Ordering>) -> bool {
    match ordering {
        None => op == ComparisonOp::Ne,
        Some(o) => match op {
            ComparisonOp::Eq => o == Ordering::Equal,
            ComparisonOp::Ne => o != Ordering::Equal,
            ComparisonOp::Lt => o == Ordering::Less,
            ComparisonOp::Le => o != Ordering::Greater,
            ComparisonOp::Gt => o == Ordering::Greater,
            ComparisonOp::Ge => o != Ordering::Less,
        },
    }
}

/// Value comparison (`eq`, `lt`, ...). Untyped operands compare as strings.
pub fn value_compare(
    op: ComparisonOp,
    left: &AtomicValue,
    right: &AtomicValue,
    implicit: FixedOffset,
) -> Result<bool, MetapathError> {
    let equality_only = matches!(op, ComparisonOp::Eq | ComparisonOp::Ne);
    Ok(apply(op, order(left, right, implicit, equality_only)?))
}

/// Converts an untyped operand of a general comparison according to the
/// type of the other operand.
fn general_operand(
    value: &AtomicValue,
    other: &AtomicValue,
) -> Result<AtomicValue, MetapathError> {
    if !value.is_untyped() {
        return Ok(value.clone());
    }
    if other.is_numeric() {
        cast::cast(value, AtomicType::Double)
    } else if other.is_untyped() || is_string_like(other) {
        Ok(AtomicValue::String(value.to_string_value()))
    } else {
        cast::cast(value, other.atomic_type())
    }
}

/// General comparison: true when any pair of atomized operands satisfies
/// the corresponding value comparison.
pub fn general_compare(
    op: ComparisonOp,
    left: &[AtomicValue],
    right: &[AtomicValue],
    implicit: FixedOffset,
) -> Result<bool, MetapathError> {
    for l in left {
        for r in right {
            let a = general_operand(l, r)?;
            let b = general_operand(r, l)?;
            if value_compare(op, &a, &b, implicit)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Equality used by `distinct-values`, `index-of` and `deep-equal`:
/// incomparable values are unequal and NaN equals NaN.
pub fn atomic_equal(left: &AtomicValue, right: &AtomicValue, implicit: FixedOffset) -> bool {
    if left.is_nan() && right.is_nan() {
        return true;
    }
    matches!(
        order(left, right, implicit, true),
        Ok(Some(Ordering::Equal))
    )
}

/// A total order for sorting: NaN sorts first, incomparable values are an
/// error.
pub fn sort_compare(
    left: &AtomicValue,
    right: &AtomicValue,
    implicit: FixedOffset,
) -> Result<Ordering, MetapathError> {
    match (left.is_nan(), right.is_nan()) {
        (true, true) => return Ok(Ordering::Equal),
        (true, false) => return Ok(Ordering::Less),
        (false, true) => return Ok(Ordering::Greater),
        _ => {}
    }
    let left = if left.is_untyped() {
        AtomicValue::String(left.to_string_value())
    } else {
        left.clone()
    };
    let right = if right.is_untyped() {
        AtomicValue::String(right.to_string_value())
    } else {
        right.clone()
    };
    Ok(order(&left, &right, implicit, false)?.unwrap_or(Ordering::Equal))
}

/// `is`, `<<` and `>>`. `None` when either operand is empty.
pub fn node_compare(
    op: NodeComparisonOp,
    left: &Sequence,
    right: &Sequence,
) -> Result<Option<bool>, MetapathError> {
    let (Some(a), Some(b)) = (single_node(left)?, single_node(right)?) else {
        return Ok(None);
    };
    Ok(Some(match op {
        NodeComparisonOp::Is => a == b,
        NodeComparisonOp::Precedes => a < b,
        NodeComparisonOp::Follows => a > b,
    }))
}

fn single_node(sequence: &Sequence) -> Result<Option<NodeRef>, MetapathError> {
    match sequence.get_first(true)? {
        None => Ok(None),
        Some(item) => match item.as_node() {
            Some(node) => Ok(Some(node.clone())),
            None => Err(MetapathError::type_error(
                codes::XPTY0004,
                format!("Node comparison requires a node, found {}", item.type_name()),
            )),
        },
    }
}

/// `union`, `intersect` and `except` over node sequences. The result is in
/// document order without duplicates.
pub fn set_operation(
    op: SetOp,
    left: &Sequence,
    right: &Sequence,
) -> Result<Sequence, MetapathError> {
    let left = left.nodes()?;
    let right = right.nodes()?;
    let mut result = match op {
        SetOp::Union => {
            let mut all = left;
            all.extend(right);
            all
        }
        SetOp::Intersect => {
            let keep: HashSet<NodeRef> = right.into_iter().collect();
            left.into_iter().filter(|n| keep.contains(n)).collect()
        }
        SetOp::Except => {
            let drop: HashSet<NodeRef> = right.into_iter().collect();
            left.into_iter().filter(|n| !drop.contains(n)).collect()
        }
    };
    result.sort();
    result.dedup();
    Ok(Sequence::from_nodes(result))
}

/// Rounds half towards positive infinity, the rounding used by `fn:round`.
pub(crate) fn round_half_up(
    value: &AtomicValue,
    precision: i32,
) -> Result<AtomicValue, MetapathError> {
    use AtomicValue as V;
    Ok(match value {
        V::Integer(i) if precision >= 0 => V::Integer(*i),
        V::Integer(i) => {
            let scale = 10_i64
                .checked_pow(precision.unsigned_abs())
                .ok_or_else(MetapathError::overflow)?;
            let result = Decimal::from(*i)
                .checked_div(Decimal::from(scale))
                .and_then(|d| d.checked_add(Decimal::new(5, 1)))
                .and_then(|d| d.floor().checked_mul(Decimal::from(scale)))
                .and_then(|d| d.to_i64())
                .ok_or_else(MetapathError::overflow)?;
            V::Integer(result)
        }
        V::Decimal(d) => {
            let strategy = if d.is_sign_negative() {
                RoundingStrategy::MidpointTowardZero
            } else {
                RoundingStrategy::MidpointAwayFromZero
            };
            let rounded = if precision >= 0 {
                d.round_dp_with_strategy(precision.unsigned_abs(), strategy)
            } else if precision.unsigned_abs() > 28 {
                Decimal::ZERO
            } else {
                let factor = Decimal::from_i128(10_i128.pow(precision.unsigned_abs()))
                    .ok_or_else(MetapathError::overflow)?;
                d.checked_div(factor)
                    .map(|d| d.round_dp_with_strategy(0, strategy))
                    .and_then(|d| d.checked_mul(factor))
                    .ok_or_else(MetapathError::overflow)?
            };
            V::Decimal(rounded.normalize())
        }
        V::Double(d) if !d.is_finite() || *d == 0.0 => V::Double(*d),
        V::Double(d) => {
            let factor = 10_f64.powi(precision);
            let rounded = (d * factor + 0.5).floor() / factor;
            // Keep the sign of values that round to zero from below.
            if rounded == 0.0 && *d < 0.0 {
                V::Double(-0.0)
            } else {
                V::Double(rounded)
            }
        }
        other => other.clone(),
    })
}
