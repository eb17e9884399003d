//! Current date/time functions, component accessors and timezone adjustment.
use chrono::{Datelike, FixedOffset, NaiveDateTime, TimeDelta, Timelike};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::{
    CallContext, FN, Function, FunctionLibrary, Implementation, Properties, one, opt, opt_atomic,
};
use crate::error::{MetapathError, codes};
use crate::types::temporal::{offset_from_duration, offset_to_duration};
use crate::types::{
    AtomicType, AtomicValue, DateTimeValue, DateValue, DurationValue, Item, Sequence, TimeValue,
};

const SECONDS_PER_DAY: i64 = 86_400;

fn now(ctx: &CallContext<'_>) -> DateTimeValue {
    let current = ctx.dynamic.current_date_time();
    DateTimeValue {
        datetime: current.naive_local(),
        timezone: Some(*current.offset()),
    }
}

fn fn_current_date_time(
    _args: &[Sequence],
    ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_atomic(AtomicValue::DateTime(now(ctx))))
}

fn fn_current_date(_args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let current = now(ctx);
    Ok(Sequence::from_atomic(AtomicValue::Date(DateValue {
        date: current.datetime.date(),
        timezone: current.timezone,
    })))
}

fn fn_current_time(_args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let current = now(ctx);
    Ok(Sequence::from_atomic(AtomicValue::Time(TimeValue {
        time: current.datetime.time(),
        timezone: current.timezone,
    })))
}

fn fn_implicit_timezone(
    _args: &[Sequence],
    ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_atomic(AtomicValue::DayTimeDuration(
        offset_to_duration(ctx.dynamic.implicit_timezone()),
    )))
}

/// Maps the first argument through `f`, passing the empty sequence through.
fn component(
    args: &[Sequence],
    f: impl FnOnce(AtomicValue) -> Option<AtomicValue>,
) -> Result<Sequence, MetapathError> {
    Ok(Sequence::from_optional(
        opt_atomic(args, 0).and_then(f).map(Item::Atomic),
    ))
}

fn seconds_of(datetime: &NaiveDateTime) -> AtomicValue {
    let whole = Decimal::from(datetime.second());
    let fraction = Decimal::new(i64::from(datetime.nanosecond() % 1_000_000_000), 9);
    AtomicValue::Decimal((whole + fraction).normalize())
}

fn timezone_of(timezone: Option<FixedOffset>) -> Option<AtomicValue> {
    timezone.map(|tz| AtomicValue::DayTimeDuration(offset_to_duration(tz)))
}

/// The date-time view of a date, dateTime or time argument.
fn as_date_time(value: &AtomicValue) -> Option<DateTimeValue> {
    match value {
        AtomicValue::DateTime(dt) => Some(*dt),
        AtomicValue::Date(d) => Some(d.to_date_time()),
        AtomicValue::Time(t) => Some(t.to_date_time()),
        _ => None,
    }
}

fn fn_year(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    component(args, |v| {
        as_date_time(&v).map(|dt| AtomicValue::Integer(i64::from(dt.datetime.year())))
    })
}

fn fn_month(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    component(args, |v| {
        as_date_time(&v).map(|dt| AtomicValue::Integer(i64::from(dt.datetime.month())))
    })
}

fn fn_day(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    component(args, |v| {
        as_date_time(&v).map(|dt| AtomicValue::Integer(i64::from(dt.datetime.day())))
    })
}

fn fn_hours(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    component(args, |v| {
        as_date_time(&v).map(|dt| AtomicValue::Integer(i64::from(dt.datetime.hour())))
    })
}

fn fn_minutes(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    component(args, |v| {
        as_date_time(&v).map(|dt| AtomicValue::Integer(i64::from(dt.datetime.minute())))
    })
}

fn fn_seconds(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    component(args, |v| as_date_time(&v).map(|dt| seconds_of(&dt.datetime)))
}

fn fn_timezone(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    component(args, |v| as_date_time(&v).and_then(|dt| timezone_of(dt.timezone)))
}

fn duration_of(value: &AtomicValue) -> Option<DurationValue> {
    match value {
        AtomicValue::Duration(d)
        | AtomicValue::DayTimeDuration(d)
        | AtomicValue::YearMonthDuration(d) => Some(*d),
        _ => None,
    }
}

/// Extracts the integer component `seconds / unit % modulus` of a duration's
/// seconds part, keeping the sign of the duration.
fn seconds_component(duration: &DurationValue, unit: i64, modulus: Option<i64>) -> AtomicValue {
    let mut value = (duration.seconds / Decimal::from(unit)).trunc();
    if let Some(modulus) = modulus {
        value %= Decimal::from(modulus);
    }
    AtomicValue::Integer(value.to_i64().unwrap_or(0))
}

fn fn_years_from_duration(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    component(args, |v| duration_of(&v).map(|d| AtomicValue::Integer(d.months / 12)))
}

fn fn_months_from_duration(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    component(args, |v| duration_of(&v).map(|d| AtomicValue::Integer(d.months % 12)))
}

fn fn_days_from_duration(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    component(args, |v| {
        duration_of(&v).map(|d| seconds_component(&d, SECONDS_PER_DAY, None))
    })
}

fn fn_hours_from_duration(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    component(args, |v| duration_of(&v).map(|d| seconds_component(&d, 3600, Some(24))))
}

fn fn_minutes_from_duration(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    component(args, |v| duration_of(&v).map(|d| seconds_component(&d, 60, Some(60))))
}

fn fn_seconds_from_duration(
    args: &[Sequence],
    _ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    component(args, |v| {
        duration_of(&v).map(|d| AtomicValue::Decimal((d.seconds % Decimal::from(60)).normalize()))
    })
}

/// `fn:dateTime`: combines a date and a time. Conflicting timezones are
/// `FORG0008`.
fn fn_date_time(args: &[Sequence], _ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let (Some(AtomicValue::Date(date)), Some(AtomicValue::Time(time))) =
        (opt_atomic(args, 0), opt_atomic(args, 1))
    else {
        return Ok(Sequence::empty());
    };
    let timezone = match (date.timezone, time.timezone) {
        (Some(a), Some(b)) if a != b => {
            return Err(MetapathError::function(
                codes::FORG0008,
                "The date and time arguments have different timezones",
            ));
        }
        (a, b) => a.or(b),
    };
    Ok(Sequence::from_atomic(AtomicValue::DateTime(DateTimeValue {
        datetime: date.date.and_time(time.time),
        timezone,
    })))
}

/// The target timezone of an `adjust-*-to-timezone` call: the implicit
/// timezone when the argument is omitted, `None` when it is empty.
fn target_timezone(
    args: &[Sequence],
    ctx: &CallContext<'_>,
) -> Result<Option<FixedOffset>, MetapathError> {
    if args.len() < 2 {
        return Ok(Some(ctx.dynamic.implicit_timezone()));
    }
    match opt_atomic(args, 1) {
        Some(AtomicValue::DayTimeDuration(d)) => offset_from_duration(&d).map(Some),
        _ => Ok(None),
    }
}

fn adjust(
    value: DateTimeValue,
    target: Option<FixedOffset>,
) -> Result<DateTimeValue, MetapathError> {
    let (Some(from), Some(to)) = (value.timezone, target) else {
        return Ok(DateTimeValue {
            datetime: value.datetime,
            timezone: target,
        });
    };
    let shift = i64::from(to.local_minus_utc()) - i64::from(from.local_minus_utc());
    let datetime = value
        .datetime
        .checked_add_signed(TimeDelta::seconds(shift))
        .ok_or_else(|| {
            MetapathError::arithmetic(codes::FODT0001, "Date/time arithmetic overflow")
        })?;
    Ok(DateTimeValue {
        datetime,
        timezone: target,
    })
}

fn fn_adjust_date_time(
    args: &[Sequence],
    ctx: &CallContext<'_>,
) -> Result<Sequence, MetapathError> {
    let Some(AtomicValue::DateTime(value)) = opt_atomic(args, 0) else {
        return Ok(Sequence::empty());
    };
    let adjusted = adjust(value, target_timezone(args, ctx)?)?;
    Ok(Sequence::from_atomic(AtomicValue::DateTime(adjusted)))
}

fn fn_adjust_date(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let Some(AtomicValue::Date(value)) = opt_atomic(args, 0) else {
        return Ok(Sequence::empty());
    };
    let adjusted = adjust(value.to_date_time(), target_timezone(args, ctx)?)?;
    Ok(Sequence::from_atomic(AtomicValue::Date(DateValue {
        date: adjusted.datetime.date(),
        timezone: adjusted.timezone,
    })))
}

fn fn_adjust_time(args: &[Sequence], ctx: &CallContext<'_>) -> Result<Sequence, MetapathError> {
    let Some(AtomicValue::Time(value)) = opt_atomic(args, 0) else {
        return Ok(Sequence::empty());
    };
    let adjusted = adjust(value.to_date_time(), target_timezone(args, ctx)?)?;
    Ok(Sequence::from_atomic(AtomicValue::Time(TimeValue {
        time: adjusted.datetime.time(),
        timezone: adjusted.timezone,
    })))
}

pub(super) fn register(library: &mut FunctionLibrary) {
    library
        .register(
            Function::new(FN, "current-dateTime", fn_current_date_time)
                .returns(one(AtomicType::DateTime))
                .properties(Properties::CONTEXT),
        )
        .register(
            Function::new(FN, "current-date", fn_current_date)
                .returns(one(AtomicType::Date))
                .properties(Properties::CONTEXT),
        )
        .register(
            Function::new(FN, "current-time", fn_current_time)
                .returns(one(AtomicType::Time))
                .properties(Properties::CONTEXT),
        )
        .register(
            Function::new(FN, "implicit-timezone", fn_implicit_timezone)
                .returns(one(AtomicType::DayTimeDuration))
                .properties(Properties::CONTEXT),
        )
        .register(
            Function::new(FN, "dateTime", fn_date_time)
                .param("arg1", opt(AtomicType::Date))
                .param("arg2", opt(AtomicType::Time))
                .returns(opt(AtomicType::DateTime)),
        );

    let accessors: [(&'static str, AtomicType, Implementation, AtomicType); 21] = [
        ("year-from-dateTime", AtomicType::DateTime, fn_year, AtomicType::Integer),
        ("month-from-dateTime", AtomicType::DateTime, fn_month, AtomicType::Integer),
        ("day-from-dateTime", AtomicType::DateTime, fn_day, AtomicType::Integer),
        ("hours-from-dateTime", AtomicType::DateTime, fn_hours, AtomicType::Integer),
        ("minutes-from-dateTime", AtomicType::DateTime, fn_minutes, AtomicType::Integer),
        ("seconds-from-dateTime", AtomicType::DateTime, fn_seconds, AtomicType::Decimal),
        ("timezone-from-dateTime", AtomicType::DateTime, fn_timezone, AtomicType::DayTimeDuration),
        ("year-from-date", AtomicType::Date, fn_year, AtomicType::Integer),
        ("month-from-date", AtomicType::Date, fn_month, AtomicType::Integer),
        ("day-from-date", AtomicType::Date, fn_day, AtomicType::Integer),
        ("timezone-from-date", AtomicType::Date, fn_timezone, AtomicType::DayTimeDuration),
        ("hours-from-time", AtomicType::Time, fn_hours, AtomicType::Integer),
        ("minutes-from-time", AtomicType::Time, fn_minutes, AtomicType::Integer),
        ("seconds-from-time", AtomicType::Time, fn_seconds, AtomicType::Decimal),
        ("timezone-from-time", AtomicType::Time, fn_timezone, AtomicType::DayTimeDuration),
        ("years-from-duration", AtomicType::Duration, fn_years_from_duration, AtomicType::Integer),
        (
            "months-from-duration",
            AtomicType::Duration,
            fn_months_from_duration,
            AtomicType::Integer,
        ),
        ("days-from-duration", AtomicType::Duration, fn_days_from_duration, AtomicType::Integer),
        ("hours-from-duration", AtomicType::Duration, fn_hours_from_duration, AtomicType::Integer),
        (
            "minutes-from-duration",
            AtomicType::Duration,
            fn_minutes_from_duration,
            AtomicType::Integer,
        ),
        (
            "seconds-from-duration",
            AtomicType::Duration,
            fn_seconds_from_duration,
            AtomicType::Decimal,
        ),
    ];
    for (name, input, implementation, output) in accessors {
        library.register(
            Function::new(FN, name, implementation)
                .param("arg", opt(input))
                .returns(opt(output)),
        );
    }

    let adjusters: [(&'static str, AtomicType, Implementation); 3] = [
        ("adjust-dateTime-to-timezone", AtomicType::DateTime, fn_adjust_date_time),
        ("adjust-date-to-timezone", AtomicType::Date, fn_adjust_date),
        ("adjust-time-to-timezone", AtomicType::Time, fn_adjust_time),
    ];
    for (name, input, implementation) in adjusters {
        library.register(
            Function::new(FN, name, implementation)
                .param("arg", opt(input))
                .optional("timezone", opt(AtomicType::DayTimeDuration))
                .returns(opt(input))
                .properties(Properties::CONTEXT),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::DateTime;

    use super::*;
    use crate::MetapathExpression;
    use crate::context::{DynamicContext, StaticContext};

    fn fixed_context() -> DynamicContext {
        let now = DateTime::parse_from_rfc3339("2024-05-06T07:08:09.5+02:00").unwrap();
        DynamicContext::builder(Arc::new(StaticContext::default()))
            .current_date_time(now)
            .implicit_timezone(FixedOffset::east_opt(2 * 3600).unwrap())
            .build()
    }

    fn eval(source: &str) -> Result<Sequence, MetapathError> {
        MetapathExpression::compile(source)?.evaluate(None, &fixed_context())
    }

    fn string(source: &str) -> String {
        match eval(source).unwrap().first() {
            Some(item) => item.string_value().unwrap(),
            None => panic!("Expected a value for {}", source),
        }
    }

    #[test]
    fn test_current_values_are_stable() {
        assert_eq!(string("current-dateTime()"), "2024-05-06T07:08:09.5+02:00");
        assert_eq!(string("current-date()"), "2024-05-06+02:00");
        assert_eq!(string("current-time()"), "07:08:09.5+02:00");
        assert_eq!(string("implicit-timezone()"), "PT2H");
        assert_eq!(
            eval("current-dateTime() = current-dateTime()").unwrap(),
            Sequence::from_bool(true)
        );
    }

    #[test]
    fn test_component_accessors() {
        let dt = "xs:dateTime('2020-03-15T10:20:30.5-05:00')";
        assert_eq!(
            eval(&format!("year-from-dateTime({})", dt)).unwrap(),
            Sequence::from_integer(2020)
        );
        assert_eq!(
            eval(&format!("month-from-dateTime({})", dt)).unwrap(),
            Sequence::from_integer(3)
        );
        assert_eq!(
            eval(&format!("hours-from-dateTime({})", dt)).unwrap(),
            Sequence::from_integer(10)
        );
        assert_eq!(
            eval(&format!("seconds-from-dateTime({})", dt)).unwrap(),
            Sequence::from_decimal(Decimal::new(305, 1))
        );
        assert_eq!(string(&format!("timezone-from-dateTime({})", dt)), "-PT5H");
        assert_eq!(
            eval("day-from-date(xs:date('2024-02-29'))").unwrap(),
            Sequence::from_integer(29)
        );
        assert!(eval("timezone-from-date(xs:date('2024-02-29'))").unwrap().is_empty());
        assert_eq!(
            eval("minutes-from-time(xs:time('13:45:00'))").unwrap(),
            Sequence::from_integer(45)
        );
        assert!(eval("year-from-date(())").unwrap().is_empty());
    }

    #[test]
    fn test_duration_accessors() {
        assert_eq!(
            eval("years-from-duration(xs:yearMonthDuration('P20Y15M'))").unwrap(),
            Sequence::from_integer(21)
        );
        assert_eq!(
            eval("months-from-duration(xs:yearMonthDuration('-P15M'))").unwrap(),
            Sequence::from_integer(-3)
        );
        assert_eq!(
            eval("days-from-duration(xs:dayTimeDuration('P3DT10H'))").unwrap(),
            Sequence::from_integer(3)
        );
        assert_eq!(
            eval("hours-from-duration(xs:dayTimeDuration('P3DT10H'))").unwrap(),
            Sequence::from_integer(10)
        );
        assert_eq!(
            eval("seconds-from-duration(xs:dayTimeDuration('PT1M30.5S'))").unwrap(),
            Sequence::from_decimal(Decimal::new(305, 1))
        );
    }

    #[test]
    fn test_date_time_constructor() {
        assert_eq!(
            string("dateTime(xs:date('1999-12-31'), xs:time('12:00:00Z'))"),
            "1999-12-31T12:00:00Z"
        );
        let err = eval("dateTime(xs:date('1999-12-31+01:00'), xs:time('12:00:00Z'))").unwrap_err();
        assert_eq!(err.code(), codes::FORG0008);
    }

    #[test]
    fn test_timezone_adjustment() {
        assert_eq!(
            string("adjust-dateTime-to-timezone(xs:dateTime('2002-03-07T10:00:00-05:00'), xs:dayTimeDuration('PT10H'))"),
            "2002-03-08T01:00:00+10:00"
        );
        assert_eq!(
            string("adjust-dateTime-to-timezone(xs:dateTime('2002-03-07T10:00:00-05:00'), ())"),
            "2002-03-07T10:00:00"
        );
        assert_eq!(
            string("adjust-dateTime-to-timezone(xs:dateTime('2002-03-07T10:00:00'))"),
            "2002-03-07T10:00:00+02:00"
        );
        assert_eq!(
            string("adjust-time-to-timezone(xs:time('10:00:00-05:00'), xs:dayTimeDuration('PT0S'))"),
            "15:00:00Z"
        );
        let err = eval(
            "adjust-date-to-timezone(xs:date('2002-03-07'), xs:dayTimeDuration('PT15H'))",
        )
        .unwrap_err();
        assert_eq!(err.code(), codes::FODT0003);
    }
}
