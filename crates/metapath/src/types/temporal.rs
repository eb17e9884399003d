//! Date, time and duration values.
//!
//! Values keep an optional explicit timezone. Comparisons and subtraction
//! normalize through the implicit timezone of the dynamic context when a value
//! carries none.
use std::cmp::Ordering;
use std::fmt::Write as _;

use chrono::{
    Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{MetapathError, codes};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateValue {
    pub date: NaiveDate,
    pub timezone: Option<FixedOffset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateTimeValue {
    pub datetime: NaiveDateTime,
    pub timezone: Option<FixedOffset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeValue {
    pub time: NaiveTime,
    pub timezone: Option<FixedOffset>,
}

/// A duration split into a month component and a seconds component. Both
/// components carry the same sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DurationValue {
    pub months: i64,
    pub seconds: Decimal,
}

impl DateValue {
    pub fn parse(lexical: &str) -> Result<Self, MetapathError> {
        let (body, timezone) = split_timezone(lexical.trim())?;
        let date = NaiveDate::parse_from_str(body, "%Y-%m-%d")
            .map_err(|_| invalid_lexical(lexical, "xs:date"))?;
        Ok(Self { date, timezone })
    }

    pub fn to_date_time(&self) -> DateTimeValue {
        DateTimeValue {
            datetime: self.date.and_time(NaiveTime::MIN),
            timezone: self.timezone,
        }
    }

    pub fn compare(&self, other: &Self, implicit: FixedOffset) -> Ordering {
        self.to_date_time().compare(&other.to_date_time(), implicit)
    }

    pub fn canonical(&self) -> String {
        let mut s = format_date(&self.date);
        push_timezone(&mut s, self.timezone);
        s
    }
}

impl DateTimeValue {
    pub fn parse(lexical: &str) -> Result<Self, MetapathError> {
        let (body, timezone) = split_timezone(lexical.trim())?;
        if let Some(date) = body.strip_suffix("T24:00:00") {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| invalid_lexical(lexical, "xs:dateTime"))?;
            let next = date
                .succ_opt()
                .ok_or_else(|| invalid_lexical(lexical, "xs:dateTime"))?;
            return Ok(Self {
                datetime: next.and_time(NaiveTime::MIN),
                timezone,
            });
        }
        let datetime = NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| invalid_lexical(lexical, "xs:dateTime"))?;
        Ok(Self { datetime, timezone })
    }

    /// The instant in UTC, using `implicit` when no timezone is present.
    pub fn to_utc(&self, implicit: FixedOffset) -> NaiveDateTime {
        let offset = self.timezone.unwrap_or(implicit);
        self.datetime - TimeDelta::seconds(i64::from(offset.local_minus_utc()))
    }

    pub fn compare(&self, other: &Self, implicit: FixedOffset) -> Ordering {
        self.to_utc(implicit).cmp(&other.to_utc(implicit))
    }

    pub fn canonical(&self) -> String {
        let mut s = format_date(&self.datetime.date());
        s.push('T');
        s.push_str(&format_time(&self.datetime.time()));
        push_timezone(&mut s, self.timezone);
        s
    }
}

impl TimeValue {
    pub fn parse(lexical: &str) -> Result<Self, MetapathError> {
        let (body, timezone) = split_timezone(lexical.trim())?;
        if body == "24:00:00" {
            return Ok(Self {
                time: NaiveTime::MIN,
                timezone,
            });
        }
        let time = NaiveTime::parse_from_str(body, "%H:%M:%S%.f")
            .map_err(|_| invalid_lexical(lexical, "xs:time"))?;
        Ok(Self { time, timezone })
    }

    /// Anchors the time on the reference date used for time comparisons.
    pub fn to_date_time(&self) -> DateTimeValue {
        let reference = NaiveDate::from_ymd_opt(1972, 12, 31).unwrap_or_default();
        DateTimeValue {
            datetime: reference.and_time(self.time),
            timezone: self.timezone,
        }
    }

    pub fn compare(&self, other: &Self, implicit: FixedOffset) -> Ordering {
        self.to_date_time().compare(&other.to_date_time(), implicit)
    }

    pub fn canonical(&self) -> String {
        let mut s = format_time(&self.time);
        push_timezone(&mut s, self.timezone);
        s
    }
}

impl DurationValue {
    pub const ZERO: DurationValue = DurationValue {
        months: 0,
        seconds: Decimal::ZERO,
    };

    pub fn from_months(months: i64) -> Self {
        Self {
            months,
            seconds: Decimal::ZERO,
        }
    }

    pub fn from_seconds(seconds: Decimal) -> Self {
        Self { months: 0, seconds }
    }

    pub fn from_time_delta(delta: TimeDelta) -> Result<Self, MetapathError> {
        Decimal::from(delta.num_seconds())
            .checked_add(Decimal::new(i64::from(delta.subsec_nanos()), 9))
            .map(|seconds| Self::from_seconds(seconds.normalize()))
            .ok_or_else(duration_overflow)
    }

    /// Parses the ISO 8601 form `-PnYnMnDTnHnMnS`. A well-formed duration
    /// whose total does not fit fails with `FODT0002`.
    pub fn parse(lexical: &str) -> Result<Self, MetapathError> {
        parse_duration(lexical.trim())
            .ok_or_else(|| invalid_lexical(lexical, "xs:duration"))?
            .total()
            .ok_or_else(duration_overflow)
    }

    pub fn parse_day_time(lexical: &str) -> Result<Self, MetapathError> {
        if lexical.contains('Y') || has_month_designator(lexical) {
            return Err(invalid_lexical(lexical, "xs:dayTimeDuration"));
        }
        Self::parse(lexical).map_err(|e| relabel(e, lexical, "xs:dayTimeDuration"))
    }

    pub fn parse_year_month(lexical: &str) -> Result<Self, MetapathError> {
        if lexical.contains('D') || lexical.contains('T') {
            return Err(invalid_lexical(lexical, "xs:yearMonthDuration"));
        }
        Self::parse(lexical).map_err(|e| relabel(e, lexical, "xs:yearMonthDuration"))
    }

    pub fn is_negative(&self) -> bool {
        self.months < 0 || self.seconds.is_sign_negative() && !self.seconds.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.seconds.is_zero()
    }

    pub fn negate(&self) -> Self {
        Self {
            months: -self.months,
            seconds: -self.seconds,
        }
    }

    pub fn to_time_delta(&self) -> Result<TimeDelta, MetapathError> {
        let secs = self.seconds.trunc().to_i64().ok_or_else(duration_overflow)?;
        let nanos = self
            .seconds
            .fract()
            .checked_mul(Decimal::from(1_000_000_000))
            .and_then(|n| n.trunc().to_i64())
            .ok_or_else(duration_overflow)?;
        TimeDelta::try_seconds(secs)
            .and_then(|delta| delta.checked_add(&TimeDelta::nanoseconds(nanos)))
            .ok_or_else(duration_overflow)
    }

    /// Canonical lexical form. `zero` is the representation of a zero length
    /// duration, which differs between the duration subtypes.
    pub fn canonical(&self, zero: &str) -> String {
        if self.is_zero() {
            return zero.to_string();
        }
        let mut s = String::new();
        if self.is_negative() {
            s.push('-');
        }
        s.push('P');
        let months = self.months.abs();
        let (years, months) = (months / 12, months % 12);
        if years > 0 {
            let _ = write!(s, "{}Y", years);
        }
        if months > 0 {
            let _ = write!(s, "{}M", months);
        }

        let total = self.seconds.abs();
        let whole = total.trunc().to_i64().unwrap_or(0);
        let fraction = total.fract();
        let days = whole / SECONDS_PER_DAY;
        let hours = (whole % SECONDS_PER_DAY) / 3600;
        let minutes = (whole % 3600) / 60;
        let secs = Decimal::from(whole % 60) + fraction;
        if days > 0 {
            let _ = write!(s, "{}D", days);
        }
        if hours > 0 || minutes > 0 || !secs.is_zero() {
            s.push('T');
            if hours > 0 {
                let _ = write!(s, "{}H", hours);
            }
            if minutes > 0 {
                let _ = write!(s, "{}M", minutes);
            }
            if !secs.is_zero() {
                let _ = write!(s, "{}S", secs.normalize());
            }
        }
        s
    }
}

fn has_month_designator(lexical: &str) -> bool {
    let date_part = lexical.split('T').next().unwrap_or("");
    date_part.contains('M')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DurationUnit {
    Years,
    Months,
    Days,
    Hours,
    Minutes,
    Seconds,
}

/// The components of a lexically valid duration, before they are summed.
struct DurationFields {
    negative: bool,
    fields: Vec<(Decimal, DurationUnit)>,
}

impl DurationFields {
    fn total(&self) -> Option<DurationValue> {
        let mut months: i64 = 0;
        let mut seconds = Decimal::ZERO;
        for (n, unit) in &self.fields {
            let factor = match unit {
                DurationUnit::Years => {
                    months = months.checked_add(n.checked_mul(Decimal::from(12))?.to_i64()?)?;
                    continue;
                }
                DurationUnit::Months => {
                    months = months.checked_add(n.to_i64()?)?;
                    continue;
                }
                DurationUnit::Days => SECONDS_PER_DAY,
                DurationUnit::Hours => 3600,
                DurationUnit::Minutes => 60,
                DurationUnit::Seconds => 1,
            };
            seconds = seconds.checked_add(n.checked_mul(Decimal::from(factor))?)?;
        }
        let value = DurationValue {
            months,
            seconds: seconds.normalize(),
        };
        Some(if self.negative { value.negate() } else { value })
    }
}

fn parse_duration(s: &str) -> Option<DurationFields> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let rest = rest.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => {
            if t.is_empty() {
                return None;
            }
            (d, Some(t))
        }
        None => (rest, None),
    };
    if date_part.is_empty() && time_part.is_none() {
        return None;
    }

    let mut fields = Vec::new();
    for (value, designator) in components(date_part)? {
        let unit = match designator {
            'Y' => DurationUnit::Years,
            'M' => DurationUnit::Months,
            'D' => DurationUnit::Days,
            _ => return None,
        };
        if value.contains('.') {
            return None;
        }
        fields.push((value, unit));
    }
    if let Some(time_part) = time_part {
        for (value, designator) in components(time_part)? {
            let unit = match designator {
                'H' => DurationUnit::Hours,
                'M' => DurationUnit::Minutes,
                'S' => DurationUnit::Seconds,
                _ => return None,
            };
            if unit != DurationUnit::Seconds && value.contains('.') {
                return None;
            }
            fields.push((value, unit));
        }
    }

    // Designators appear at most once and in order.
    if fields.windows(2).any(|w| w[0].1 >= w[1].1) {
        return None;
    }
    let fields = fields
        .into_iter()
        .map(|(value, unit)| value.parse::<Decimal>().ok().map(|n| (n, unit)))
        .collect::<Option<Vec<_>>>()?;
    Some(DurationFields { negative, fields })
}

/// Splits `12Y3M` into `[("12", 'Y'), ("3", 'M')]`.
fn components(s: &str) -> Option<Vec<(&str, char)>> {
    let mut result = Vec::new();
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c.is_ascii_digit() || c == '.' {
            continue;
        }
        if i == start {
            return None;
        }
        result.push((&s[start..i], c));
        start = i + c.len_utf8();
    }
    if start != s.len() {
        return None;
    }
    Some(result)
}

fn split_timezone(s: &str) -> Result<(&str, Option<FixedOffset>), MetapathError> {
    if let Some(body) = s.strip_suffix('Z') {
        return Ok((body, FixedOffset::east_opt(0)));
    }
    let bytes = s.as_bytes();
    if s.len() > 6 {
        let sign_at = s.len() - 6;
        let sign = bytes[sign_at];
        if (sign == b'+' || sign == b'-') && bytes[sign_at + 3] == b':' {
            let hours: i32 = s[sign_at + 1..sign_at + 3]
                .parse()
                .map_err(|_| invalid_timezone(s))?;
            let minutes: i32 = s[sign_at + 4..]
                .parse()
                .map_err(|_| invalid_timezone(s))?;
            if hours > 14 || minutes > 59 || (hours == 14 && minutes > 0) {
                return Err(invalid_timezone(s));
            }
            let mut secs = hours * 3600 + minutes * 60;
            if sign == b'-' {
                secs = -secs;
            }
            let offset = FixedOffset::east_opt(secs).ok_or_else(|| invalid_timezone(s))?;
            return Ok((&s[..sign_at], Some(offset)));
        }
    }
    Ok((s, None))
}

fn invalid_timezone(s: &str) -> MetapathError {
    MetapathError::invalid_value(codes::FODT0003, format!("Invalid timezone in '{}'", s))
}

/// Names the duration subtype in lexical errors, keeping overflow errors.
fn relabel(err: MetapathError, lexical: &str, type_name: &str) -> MetapathError {
    if err.code() == codes::FORG0001 {
        invalid_lexical(lexical, type_name)
    } else {
        err
    }
}

fn duration_overflow() -> MetapathError {
    MetapathError::arithmetic(codes::FODT0002, "Duration out of range")
}

fn invalid_lexical(lexical: &str, type_name: &str) -> MetapathError {
    MetapathError::invalid_value(
        codes::FORG0001,
        format!("'{}' is not a valid lexical form of {}", lexical, type_name),
    )
}

fn format_date(date: &NaiveDate) -> String {
    let year = date.year();
    if year < 0 {
        format!("-{:04}-{:02}-{:02}", -year, date.month(), date.day())
    } else {
        format!("{:04}-{:02}-{:02}", year, date.month(), date.day())
    }
}

fn format_time(time: &NaiveTime) -> String {
    let mut s = format!("{:02}:{:02}:{:02}", time.hour(), time.minute(), time.second());
    let nanos = time.nanosecond() % 1_000_000_000;
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        s.push('.');
        s.push_str(fraction.trim_end_matches('0'));
    }
    s
}

/// Formats an offset as `Z` or `+hh:mm`.
pub fn format_offset(offset: FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    if secs == 0 {
        return "Z".to_string();
    }
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("{}{:02}:{:02}", sign, secs / 3600, (secs % 3600) / 60)
}

fn push_timezone(s: &mut String, timezone: Option<FixedOffset>) {
    if let Some(tz) = timezone {
        s.push_str(&format_offset(tz));
    }
}

/// Converts a day-time duration into a timezone offset, as used by
/// `adjust-*-to-timezone` and the implicit timezone.
pub fn offset_from_duration(duration: &DurationValue) -> Result<FixedOffset, MetapathError> {
    let secs = duration.seconds.trunc().to_i32().unwrap_or(i32::MAX);
    if secs.abs() > 14 * 3600 || duration.seconds.fract() != Decimal::ZERO || secs % 60 != 0 {
        return Err(MetapathError::invalid_value(
            codes::FODT0003,
            format!("Invalid timezone offset {}", duration.canonical("PT0S")),
        ));
    }
    FixedOffset::east_opt(secs)
        .ok_or_else(|| MetapathError::invalid_value(codes::FODT0003, "Invalid timezone offset"))
}

pub fn offset_to_duration(offset: FixedOffset) -> DurationValue {
    DurationValue::from_seconds(Decimal::from(offset.local_minus_utc()))
}

/// Adds a duration to a date-time, applying the month component first.
pub fn add_duration(
    datetime: NaiveDateTime,
    duration: &DurationValue,
) -> Result<NaiveDateTime, MetapathError> {
    let overflow = || MetapathError::arithmetic(codes::FODT0001, "Date/time arithmetic overflow");
    let months = u32::try_from(duration.months.unsigned_abs()).map_err(|_| overflow())?;
    let shifted = if duration.months >= 0 {
        datetime.checked_add_months(Months::new(months))
    } else {
        datetime.checked_sub_months(Months::new(months))
    }
    .ok_or_else(overflow)?;
    let delta = duration.to_time_delta().map_err(|_| overflow())?;
    shifted.checked_add_signed(delta).ok_or_else(overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_round_trip() {
        let d = DateValue::parse("2024-02-29Z").unwrap();
        assert_eq!(d.canonical(), "2024-02-29Z");
        let d = DateValue::parse("2024-02-29+05:30").unwrap();
        assert_eq!(d.canonical(), "2024-02-29+05:30");
        assert!(DateValue::parse("2023-02-29").is_err());
    }

    #[test]
    fn test_date_time_fraction_and_comparison() {
        let a = DateTimeValue::parse("2020-01-01T10:00:00.500Z").unwrap();
        assert_eq!(a.canonical(), "2020-01-01T10:00:00.5Z");
        let b = DateTimeValue::parse("2020-01-01T11:00:00+01:00").unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            DateTimeValue::parse("2020-01-01T10:00:00Z").unwrap().compare(&b, utc),
            Ordering::Equal
        );
        assert_eq!(a.compare(&b, utc), Ordering::Greater);
    }

    #[test]
    fn test_duration_parse_and_canonical() {
        let d = DurationValue::parse("P1Y2M3DT4H5M6.5S").unwrap();
        assert_eq!(d.months, 14);
        assert_eq!(d.canonical("PT0S"), "P1Y2M3DT4H5M6.5S");
        assert_eq!(DurationValue::parse("-PT90M").unwrap().canonical("PT0S"), "-PT1H30M");
        assert_eq!(DurationValue::parse("PT0S").unwrap().canonical("PT0S"), "PT0S");
        assert!(DurationValue::parse("P").is_err());
        assert!(DurationValue::parse("P1DT").is_err());
        assert!(DurationValue::parse("PT1M2H").is_err());
        assert!(DurationValue::parse_day_time("P1Y").is_err());
        assert!(DurationValue::parse_year_month("P1D").is_err());
    }

    #[test]
    fn test_duration_overflow_is_a_duration_error() {
        let err = DurationValue::parse_day_time("PT79228162514264337593543950335H").unwrap_err();
        assert_eq!(err.code(), codes::FODT0002);
        let err = DurationValue::parse("P9223372036854775807Y").unwrap_err();
        assert_eq!(err.code(), codes::FODT0002);
        assert_eq!(
            DurationValue::parse_day_time("P1M").unwrap_err().code(),
            codes::FORG0001
        );

        let huge = DurationValue::parse("P999999999999999D").unwrap();
        assert_eq!(huge.to_time_delta().unwrap_err().code(), codes::FODT0002);
        let dt = DateTimeValue::parse("2020-01-01T00:00:00Z").unwrap().datetime;
        assert_eq!(add_duration(dt, &huge).unwrap_err().code(), codes::FODT0001);
    }

    #[test]
    fn test_add_months_clamps_day() {
        let dt = DateTimeValue::parse("2021-01-31T00:00:00").unwrap().datetime;
        let shifted = add_duration(dt, &DurationValue::from_months(1)).unwrap();
        assert_eq!(shifted.date(), NaiveDate::from_ymd_opt(2021, 2, 28).unwrap());
    }
}
