//! Adapters from declared Metaschema data types to atomic values.
use std::net::{Ipv4Addr, Ipv6Addr};

use metaschema_model::DataType;
use url::Url;
use uuid::Uuid;

use super::atomic::{AtomicType, AtomicValue, is_nc_name};
use crate::error::{MetapathError, codes};

/// The atomic type a value of `datatype` atomizes to.
pub fn atomic_type_of(datatype: DataType) -> AtomicType {
    match datatype {
        DataType::Token => AtomicType::Token,
        DataType::NcName => AtomicType::NcName,
        DataType::Integer => AtomicType::Integer,
        DataType::NonNegativeInteger => AtomicType::NonNegativeInteger,
        DataType::PositiveInteger => AtomicType::PositiveInteger,
        DataType::Decimal => AtomicType::Decimal,
        DataType::Boolean => AtomicType::Boolean,
        DataType::Date | DataType::DateWithTimezone => AtomicType::Date,
        DataType::DateTime | DataType::DateTimeWithTimezone => AtomicType::DateTime,
        DataType::DayTimeDuration => AtomicType::DayTimeDuration,
        DataType::YearMonthDuration => AtomicType::YearMonthDuration,
        DataType::Uri | DataType::UriReference => AtomicType::AnyUri,
        DataType::Base64 => AtomicType::Base64Binary,
        DataType::String
        | DataType::EmailAddress
        | DataType::Hostname
        | DataType::IpV4Address
        | DataType::IpV6Address
        | DataType::Uuid
        | DataType::MarkupLine
        | DataType::MarkupMultiline => AtomicType::String,
    }
}

/// Parses `lexical` as a value of `datatype`, failing with `FORG0001` when the
/// lexical form does not conform.
pub fn parse_typed_value(datatype: DataType, lexical: &str) -> Result<AtomicValue, MetapathError> {
    let trimmed = lexical.trim();
    let fail = || {
        MetapathError::invalid_value(
            codes::FORG0001,
            format!("Value '{}' is not a valid '{}'", lexical, datatype.name()),
        )
    };
    let check = |ok: bool| if ok { Ok(()) } else { Err(fail()) };

    match datatype {
        DataType::String => {
            check(!trimmed.is_empty())?;
            Ok(AtomicValue::String(lexical.to_string()))
        }
        DataType::MarkupLine | DataType::MarkupMultiline => {
            Ok(AtomicValue::String(lexical.to_string()))
        }
        DataType::Token => {
            check(is_token(trimmed))?;
            Ok(AtomicValue::Token(trimmed.to_string()))
        }
        DataType::NcName => {
            check(is_nc_name(trimmed))?;
            Ok(AtomicValue::NcName(trimmed.to_string()))
        }
        DataType::DateWithTimezone | DataType::DateTimeWithTimezone => {
            let value = atomic_type_of(datatype).parse(lexical).map_err(|_| fail())?;
            let has_timezone = match &value {
                AtomicValue::Date(d) => d.timezone.is_some(),
                AtomicValue::DateTime(dt) => dt.timezone.is_some(),
                _ => false,
            };
            check(has_timezone)?;
            Ok(value)
        }
        DataType::EmailAddress => {
            let valid = trimmed.split_once('@').is_some_and(|(local, domain)| {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            }) && !trimmed.contains(char::is_whitespace);
            check(valid)?;
            Ok(AtomicValue::String(trimmed.to_string()))
        }
        DataType::Hostname => {
            check(is_hostname(trimmed))?;
            Ok(AtomicValue::String(trimmed.to_string()))
        }
        DataType::IpV4Address => {
            trimmed.parse::<Ipv4Addr>().map_err(|_| fail())?;
            Ok(AtomicValue::String(trimmed.to_string()))
        }
        DataType::IpV6Address => {
            trimmed.parse::<Ipv6Addr>().map_err(|_| fail())?;
            Ok(AtomicValue::String(trimmed.to_string()))
        }
        DataType::Uri => {
            Url::parse(trimmed).map_err(|_| fail())?;
            Ok(AtomicValue::AnyUri(trimmed.to_string()))
        }
        DataType::UriReference => {
            match Url::parse(trimmed) {
                Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {}
                Err(_) => return Err(fail()),
            }
            check(!trimmed.contains(char::is_whitespace))?;
            Ok(AtomicValue::AnyUri(trimmed.to_string()))
        }
        DataType::Uuid => {
            let uuid = Uuid::parse_str(trimmed).map_err(|_| fail())?;
            check(uuid.hyphenated().to_string() == trimmed.to_ascii_lowercase())?;
            Ok(AtomicValue::String(trimmed.to_string()))
        }
        other => atomic_type_of(other).parse(lexical).map_err(|_| fail()),
    }
}

/// `true` when `lexical` is a valid value of `datatype`.
pub fn conforms(datatype: DataType, lexical: &str) -> bool {
    parse_typed_value(datatype, lexical).is_ok()
}

fn is_token(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

fn is_hostname(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 253
        && s.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_data_type_has_an_adapter() {
        let samples = [
            (DataType::String, "text"),
            (DataType::Token, "a-token"),
            (DataType::NcName, "name"),
            (DataType::Integer, "-5"),
            (DataType::NonNegativeInteger, "0"),
            (DataType::PositiveInteger, "3"),
            (DataType::Decimal, "1.50"),
            (DataType::Boolean, "true"),
            (DataType::Date, "2024-01-01"),
            (DataType::DateTime, "2024-01-01T00:00:00"),
            (DataType::DateWithTimezone, "2024-01-01Z"),
            (DataType::DateTimeWithTimezone, "2024-01-01T00:00:00-05:00"),
            (DataType::DayTimeDuration, "PT1H"),
            (DataType::YearMonthDuration, "P1Y"),
            (DataType::EmailAddress, "user@example.com"),
            (DataType::Hostname, "www.example.com"),
            (DataType::IpV4Address, "10.0.0.1"),
            (DataType::IpV6Address, "::1"),
            (DataType::Uri, "https://example.com/a"),
            (DataType::UriReference, "../relative#frag"),
            (DataType::Uuid, "6b3a9bb5-5a44-4d6f-8bd5-3bb3c2a2f3a1"),
            (DataType::Base64, "aGVsbG8="),
            (DataType::MarkupLine, "**bold**"),
            (DataType::MarkupMultiline, "para"),
        ];
        assert_eq!(samples.len(), DataType::ALL.len());
        for (datatype, lexical) in samples {
            assert!(conforms(datatype, lexical), "{} should accept '{}'", datatype, lexical);
        }
    }

    #[test]
    fn test_rejections_report_forg0001() {
        for (datatype, lexical) in [
            (DataType::PositiveInteger, "0"),
            (DataType::DateWithTimezone, "2024-01-01"),
            (DataType::IpV4Address, "256.1.1.1"),
            (DataType::Uri, "relative/path"),
            (DataType::Uuid, "not-a-uuid"),
            (DataType::EmailAddress, "no-at-sign"),
            (DataType::Token, "has space"),
        ] {
            let err = parse_typed_value(datatype, lexical).unwrap_err();
            assert_eq!(err.code(), codes::FORG0001, "{} / {}", datatype, lexical);
        }
    }

    #[test]
    fn test_atomized_types() {
        assert_eq!(
            parse_typed_value(DataType::Decimal, "1.50").unwrap().to_string_value(),
            "1.5"
        );
        assert!(matches!(
            parse_typed_value(DataType::Uri, "https://example.com").unwrap(),
            AtomicValue::AnyUri(_)
        ));
    }
}
