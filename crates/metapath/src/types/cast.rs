//! The atomic cast matrix used by `cast as`, `castable as`, the `xs:*`
//! constructor functions and function argument coercion.
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::atomic::{AtomicType, AtomicValue, double_to_decimal};
use super::temporal::{DateValue, DurationValue, TimeValue};
use crate::error::{MetapathError, codes};

pub fn cast(value: &AtomicValue, target: AtomicType) -> Result<AtomicValue, MetapathError> {
    if value.atomic_type() == target {
        return Ok(value.clone());
    }
    if target.is_abstract() {
        return Err(unsupported(value, target));
    }
    if let Some(s) = value.as_str() {
        return match target {
            AtomicType::String => Ok(AtomicValue::String(s.to_string())),
            AtomicType::UntypedAtomic => Ok(AtomicValue::UntypedAtomic(s.to_string())),
            _ => target.parse(s),
        };
    }

    use AtomicType as T;
    use AtomicValue as V;
    let result = match (value, target) {
        (_, T::String) => V::String(value.to_string_value()),
        (_, T::UntypedAtomic) => V::UntypedAtomic(value.to_string_value()),
        (_, T::Token) => T::Token.parse(&value.to_string_value())?,
        (_, T::NcName) => T::NcName.parse(&value.to_string_value())?,

        (V::Integer(i), T::Boolean) => V::Boolean(*i != 0),
        (V::Decimal(d), T::Boolean) => V::Boolean(!d.is_zero()),
        (V::Double(d), T::Boolean) => V::Boolean(*d != 0.0 && !d.is_nan()),

        (V::Boolean(b), T::Integer | T::NonNegativeInteger) => V::Integer(i64::from(*b)),
        (V::Boolean(true), T::PositiveInteger) => V::Integer(1),
        (V::Integer(i), T::NonNegativeInteger | T::PositiveInteger) => {
            check_integer_range(*i, target)?
        }
        (V::Decimal(d), T::Integer | T::NonNegativeInteger | T::PositiveInteger) => {
            let i = d.trunc().to_i64().ok_or_else(MetapathError::overflow)?;
            check_integer_range(i, target)?
        }
        (V::Double(d), T::Integer | T::NonNegativeInteger | T::PositiveInteger) => {
            if !d.is_finite() {
                return Err(MetapathError::invalid_cast(
                    codes::FOCA0002,
                    value.to_string_value(),
                    target.name(),
                ));
            }
            let truncated = d.trunc();
            if truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
                return Err(MetapathError::overflow());
            }
            check_integer_range(truncated as i64, target)?
        }

        (V::Boolean(b), T::Decimal) => V::Decimal(Decimal::from(i64::from(*b))),
        (V::Integer(i), T::Decimal) => V::Decimal(Decimal::from(*i)),
        (V::Double(d), T::Decimal) => V::Decimal(double_to_decimal(*d)?),

        (V::Boolean(b), T::Double) => V::Double(if *b { 1.0 } else { 0.0 }),
        (V::Integer(_) | V::Decimal(_), T::Double) => {
            V::Double(value.to_double().unwrap_or(f64::NAN))
        }

        (V::DateTime(dt), T::Date) => V::Date(DateValue {
            date: dt.datetime.date(),
            timezone: dt.timezone,
        }),
        (V::DateTime(dt), T::Time) => V::Time(TimeValue {
            time: dt.datetime.time(),
            timezone: dt.timezone,
        }),
        (V::Date(d), T::DateTime) => V::DateTime(d.to_date_time()),

        (V::DayTimeDuration(d) | V::YearMonthDuration(d), T::Duration) => V::Duration(*d),
        (V::Duration(d), T::DayTimeDuration) => {
            V::DayTimeDuration(DurationValue::from_seconds(d.seconds))
        }
        (V::YearMonthDuration(_), T::DayTimeDuration) => V::DayTimeDuration(DurationValue::ZERO),
        (V::Duration(d), T::YearMonthDuration) => {
            V::YearMonthDuration(DurationValue::from_months(d.months))
        }
        (V::DayTimeDuration(_), T::YearMonthDuration) => {
            V::YearMonthDuration(DurationValue::ZERO)
        }

        _ => return Err(unsupported(value, target)),
    };
    Ok(result)
}

pub fn castable(value: &AtomicValue, target: AtomicType) -> bool {
    cast(value, target).is_ok()
}

fn check_integer_range(i: i64, target: AtomicType) -> Result<AtomicValue, MetapathError> {
    let ok = match target {
        AtomicType::NonNegativeInteger => i >= 0,
        AtomicType::PositiveInteger => i > 0,
        _ => true,
    };
    if ok {
        Ok(AtomicValue::Integer(i))
    } else {
        Err(MetapathError::invalid_value(
            codes::FORG0001,
            format!("{} is out of range for {}", i, target.name()),
        ))
    }
}

fn unsupported(value: &AtomicValue, target: AtomicType) -> MetapathError {
    MetapathError::invalid_cast(codes::XPTY0004, value.type_name(), target.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_casts() {
        assert_eq!(
            cast(&AtomicValue::Double(3.9), AtomicType::Integer).unwrap(),
            AtomicValue::Integer(3)
        );
        assert_eq!(
            cast(&AtomicValue::Integer(7), AtomicType::Decimal).unwrap(),
            AtomicValue::Decimal(Decimal::from(7))
        );
        let err = cast(&AtomicValue::Double(f64::NAN), AtomicType::Integer).unwrap_err();
        assert_eq!(err.code(), codes::FOCA0002);
        let err = cast(&AtomicValue::Double(f64::INFINITY), AtomicType::Decimal).unwrap_err();
        assert_eq!(err.code(), codes::FOCA0002);
    }

    #[test]
    fn test_string_casts() {
        assert_eq!(
            cast(&AtomicValue::from("12"), AtomicType::Integer).unwrap(),
            AtomicValue::Integer(12)
        );
        let err = cast(&AtomicValue::from("twelve"), AtomicType::Integer).unwrap_err();
        assert_eq!(err.code(), codes::FORG0001);
        assert_eq!(
            cast(&AtomicValue::Boolean(true), AtomicType::String).unwrap(),
            AtomicValue::from("true")
        );
    }

    #[test]
    fn test_unsupported_casts() {
        let err = cast(&AtomicValue::Boolean(true), AtomicType::Date).unwrap_err();
        assert_eq!(err.code(), codes::XPTY0004);
        assert!(!castable(&AtomicValue::Integer(1), AtomicType::Duration));
        assert!(castable(&AtomicValue::from("P1D"), AtomicType::DayTimeDuration));
    }

    #[test]
    fn test_temporal_casts() {
        let dt = AtomicType::DateTime.parse("2024-05-01T12:30:00Z").unwrap();
        assert_eq!(
            cast(&dt, AtomicType::Date).unwrap().to_string_value(),
            "2024-05-01Z"
        );
        assert_eq!(
            cast(&dt, AtomicType::Time).unwrap().to_string_value(),
            "12:30:00Z"
        );
    }
}
