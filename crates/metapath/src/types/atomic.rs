use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use super::temporal::{DateTimeValue, DateValue, DurationValue, TimeValue};
use crate::error::{MetapathError, codes};

/// An expanded name. `prefix` is kept only for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QNameValue {
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub local: String,
}

impl QNameValue {
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            namespace: None,
            local: local.into(),
        }
    }

    pub fn with_namespace(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            namespace: Some(namespace.into()),
            local: local.into(),
        }
    }

    /// Two names are the same when namespace and local part agree.
    pub fn same_name(&self, other: &QNameValue) -> bool {
        self.namespace == other.namespace && self.local == other.local
    }
}

impl fmt::Display for QNameValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{}:{}", p, self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    String(String),
    Token(String),
    NcName(String),
    UntypedAtomic(String),
    AnyUri(String),
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    Date(DateValue),
    DateTime(DateTimeValue),
    Time(TimeValue),
    Duration(DurationValue),
    DayTimeDuration(DurationValue),
    YearMonthDuration(DurationValue),
    QName(QNameValue),
    Base64Binary(Vec<u8>),
}

impl AtomicValue {
    pub fn type_name(&self) -> &'static str {
        self.atomic_type().name()
    }

    pub fn atomic_type(&self) -> AtomicType {
        match self {
            AtomicValue::String(_) => AtomicType::String,
            AtomicValue::Token(_) => AtomicType::Token,
            AtomicValue::NcName(_) => AtomicType::NcName,
            AtomicValue::UntypedAtomic(_) => AtomicType::UntypedAtomic,
            AtomicValue::AnyUri(_) => AtomicType::AnyUri,
            AtomicValue::Boolean(_) => AtomicType::Boolean,
            AtomicValue::Integer(_) => AtomicType::Integer,
            AtomicValue::Decimal(_) => AtomicType::Decimal,
            AtomicValue::Double(_) => AtomicType::Double,
            AtomicValue::Date(_) => AtomicType::Date,
            AtomicValue::DateTime(_) => AtomicType::DateTime,
            AtomicValue::Time(_) => AtomicType::Time,
            AtomicValue::Duration(_) => AtomicType::Duration,
            AtomicValue::DayTimeDuration(_) => AtomicType::DayTimeDuration,
            AtomicValue::YearMonthDuration(_) => AtomicType::YearMonthDuration,
            AtomicValue::QName(_) => AtomicType::QName,
            AtomicValue::Base64Binary(_) => AtomicType::Base64Binary,
        }
    }

    /// The canonical lexical form of the value.
    pub fn to_string_value(&self) -> String {
        match self {
            AtomicValue::String(s)
            | AtomicValue::Token(s)
            | AtomicValue::NcName(s)
            | AtomicValue::UntypedAtomic(s)
            | AtomicValue::AnyUri(s) => s.clone(),
            AtomicValue::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Decimal(d) => format_decimal(d),
            AtomicValue::Double(d) => format_double(*d),
            AtomicValue::Date(d) => d.canonical(),
            AtomicValue::DateTime(d) => d.canonical(),
            AtomicValue::Time(t) => t.canonical(),
            AtomicValue::Duration(d) | AtomicValue::DayTimeDuration(d) => d.canonical("PT0S"),
            AtomicValue::YearMonthDuration(d) => d.canonical("P0M"),
            AtomicValue::QName(q) => q.to_string(),
            AtomicValue::Base64Binary(bytes) => STANDARD.encode(bytes),
        }
    }

    /// The string content of string-like values (string, token, NCName,
    /// anyURI, untypedAtomic).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AtomicValue::String(s)
            | AtomicValue::Token(s)
            | AtomicValue::NcName(s)
            | AtomicValue::UntypedAtomic(s)
            | AtomicValue::AnyUri(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_)
        )
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, AtomicValue::UntypedAtomic(_))
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, AtomicValue::Double(d) if d.is_nan())
    }

    /// Numeric values as `f64`; `None` for any other type.
    pub fn to_double(&self) -> Option<f64> {
        match self {
            AtomicValue::Integer(i) => Some(*i as f64),
            AtomicValue::Decimal(d) => d.to_f64(),
            AtomicValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn effective_boolean_value(&self) -> Result<bool, MetapathError> {
        match self {
            AtomicValue::Boolean(b) => Ok(*b),
            AtomicValue::Integer(i) => Ok(*i != 0),
            AtomicValue::Decimal(d) => Ok(!d.is_zero()),
            AtomicValue::Double(d) => Ok(*d != 0.0 && !d.is_nan()),
            other => match other.as_str() {
                Some(s) => Ok(!s.is_empty()),
                None => Err(MetapathError::type_error(
                    codes::FORG0006,
                    format!("Effective boolean value is not defined for {}", other.type_name()),
                )),
            },
        }
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_value())
    }
}

impl From<String> for AtomicValue {
    fn from(s: String) -> Self {
        AtomicValue::String(s)
    }
}

impl From<&str> for AtomicValue {
    fn from(s: &str) -> Self {
        AtomicValue::String(s.to_string())
    }
}

impl From<bool> for AtomicValue {
    fn from(b: bool) -> Self {
        AtomicValue::Boolean(b)
    }
}

impl From<i64> for AtomicValue {
    fn from(i: i64) -> Self {
        AtomicValue::Integer(i)
    }
}

impl From<Decimal> for AtomicValue {
    fn from(d: Decimal) -> Self {
        AtomicValue::Decimal(d)
    }
}

impl From<f64> for AtomicValue {
    fn from(d: f64) -> Self {
        AtomicValue::Double(d)
    }
}

/// Formats a decimal without trailing fractional zeros.
pub fn format_decimal(d: &Decimal) -> String {
    if d.is_zero() {
        return "0".to_string();
    }
    d.normalize().to_string()
}

/// Formats a double per the XPath casting rules: plain notation inside
/// `[1e-6, 1e6)`, scientific notation with at least one fractional digit
/// outside it.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if d == 0.0 {
        return if d.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let magnitude = d.abs();
    if (1e-6..1e6).contains(&magnitude) {
        return d.to_string();
    }
    let formatted = format!("{:E}", d);
    match formatted.split_once('E') {
        Some((mantissa, exponent)) if !mantissa.contains('.') => {
            format!("{}.0E{}", mantissa, exponent)
        }
        _ => formatted,
    }
}

pub fn is_nc_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}'))
}

/// The atomic types known to the type system, including abstract types that
/// only appear in type tests and function signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    AnyAtomic,
    String,
    Token,
    NcName,
    UntypedAtomic,
    AnyUri,
    Boolean,
    Numeric,
    Integer,
    NonNegativeInteger,
    PositiveInteger,
    Decimal,
    Double,
    Date,
    DateTime,
    Time,
    Duration,
    DayTimeDuration,
    YearMonthDuration,
    QName,
    Base64Binary,
}

impl AtomicType {
    pub fn name(&self) -> &'static str {
        match self {
            AtomicType::AnyAtomic => "xs:anyAtomicType",
            AtomicType::String => "xs:string",
            AtomicType::Token => "xs:token",
            AtomicType::NcName => "xs:NCName",
            AtomicType::UntypedAtomic => "xs:untypedAtomic",
            AtomicType::AnyUri => "xs:anyURI",
            AtomicType::Boolean => "xs:boolean",
            AtomicType::Numeric => "xs:numeric",
            AtomicType::Integer => "xs:integer",
            AtomicType::NonNegativeInteger => "xs:nonNegativeInteger",
            AtomicType::PositiveInteger => "xs:positiveInteger",
            AtomicType::Decimal => "xs:decimal",
            AtomicType::Double => "xs:double",
            AtomicType::Date => "xs:date",
            AtomicType::DateTime => "xs:dateTime",
            AtomicType::Time => "xs:time",
            AtomicType::Duration => "xs:duration",
            AtomicType::DayTimeDuration => "xs:dayTimeDuration",
            AtomicType::YearMonthDuration => "xs:yearMonthDuration",
            AtomicType::QName => "xs:QName",
            AtomicType::Base64Binary => "xs:base64Binary",
        }
    }

    /// Resolves a local name in the `xs` namespace. Narrow XML Schema types
    /// without a dedicated representation map onto their closest supertype.
    pub fn from_name(local: &str) -> Option<AtomicType> {
        let t = match local {
            "anyAtomicType" => AtomicType::AnyAtomic,
            "string" | "normalizedString" => AtomicType::String,
            "token" | "language" => AtomicType::Token,
            "NCName" | "ID" | "IDREF" => AtomicType::NcName,
            "untypedAtomic" => AtomicType::UntypedAtomic,
            "anyURI" => AtomicType::AnyUri,
            "boolean" => AtomicType::Boolean,
            "numeric" => AtomicType::Numeric,
            "integer" | "int" | "long" | "short" | "byte" => AtomicType::Integer,
            "nonNegativeInteger" | "unsignedInt" | "unsignedLong" => {
                AtomicType::NonNegativeInteger
            }
            "positiveInteger" => AtomicType::PositiveInteger,
            "decimal" => AtomicType::Decimal,
            "double" | "float" => AtomicType::Double,
            "date" => AtomicType::Date,
            "dateTime" | "dateTimeStamp" => AtomicType::DateTime,
            "time" => AtomicType::Time,
            "duration" => AtomicType::Duration,
            "dayTimeDuration" => AtomicType::DayTimeDuration,
            "yearMonthDuration" => AtomicType::YearMonthDuration,
            "QName" => AtomicType::QName,
            "base64Binary" => AtomicType::Base64Binary,
            _ => return None,
        };
        Some(t)
    }

    /// `true` for types that can never be the type of a value.
    pub fn is_abstract(&self) -> bool {
        matches!(self, AtomicType::AnyAtomic | AtomicType::Numeric)
    }

    /// Whether `value` is an instance of this type, honouring derivation
    /// (every integer is a decimal, every token a string, and so on).
    pub fn is_instance(&self, value: &AtomicValue) -> bool {
        use AtomicType as T;
        use AtomicValue as V;
        match (self, value) {
            (T::AnyAtomic, _) => true,
            (T::String, V::String(_) | V::Token(_) | V::NcName(_)) => true,
            (T::Token, V::Token(_) | V::NcName(_)) => true,
            (T::NcName, V::NcName(_)) => true,
            (T::UntypedAtomic, V::UntypedAtomic(_)) => true,
            (T::AnyUri, V::AnyUri(_)) => true,
            (T::Boolean, V::Boolean(_)) => true,
            (T::Numeric, V::Integer(_) | V::Decimal(_) | V::Double(_)) => true,
            (T::Decimal, V::Integer(_) | V::Decimal(_)) => true,
            (T::Integer, V::Integer(_)) => true,
            (T::NonNegativeInteger, V::Integer(i)) => *i >= 0,
            (T::PositiveInteger, V::Integer(i)) => *i > 0,
            (T::Double, V::Double(_)) => true,
            (T::Date, V::Date(_)) => true,
            (T::DateTime, V::DateTime(_)) => true,
            (T::Time, V::Time(_)) => true,
            (
                T::Duration,
                V::Duration(_) | V::DayTimeDuration(_) | V::YearMonthDuration(_),
            ) => true,
            (T::DayTimeDuration, V::DayTimeDuration(_)) => true,
            (T::YearMonthDuration, V::YearMonthDuration(_)) => true,
            (T::QName, V::QName(_)) => true,
            (T::Base64Binary, V::Base64Binary(_)) => true,
            _ => false,
        }
    }

    /// Parses a lexical form into a value of this type.
    pub fn parse(&self, lexical: &str) -> Result<AtomicValue, MetapathError> {
        let trimmed = lexical.trim();
        let value = match self {
            AtomicType::String => AtomicValue::String(lexical.to_string()),
            AtomicType::UntypedAtomic => AtomicValue::UntypedAtomic(lexical.to_string()),
            AtomicType::Token => AtomicValue::Token(collapse_whitespace(lexical)),
            AtomicType::NcName => {
                if !is_nc_name(trimmed) {
                    return Err(invalid(lexical, self));
                }
                AtomicValue::NcName(trimmed.to_string())
            }
            AtomicType::AnyUri => AtomicValue::AnyUri(trimmed.to_string()),
            AtomicType::Boolean => match trimmed {
                "true" | "1" => AtomicValue::Boolean(true),
                "false" | "0" => AtomicValue::Boolean(false),
                _ => return Err(invalid(lexical, self)),
            },
            AtomicType::Integer => AtomicValue::Integer(parse_integer(trimmed, lexical)?),
            AtomicType::NonNegativeInteger => {
                let i = parse_integer(trimmed, lexical)?;
                if i < 0 {
                    return Err(invalid(lexical, self));
                }
                AtomicValue::Integer(i)
            }
            AtomicType::PositiveInteger => {
                let i = parse_integer(trimmed, lexical)?;
                if i <= 0 {
                    return Err(invalid(lexical, self));
                }
                AtomicValue::Integer(i)
            }
            AtomicType::Decimal => AtomicValue::Decimal(parse_decimal(trimmed, lexical)?),
            AtomicType::Double | AtomicType::Numeric => {
                AtomicValue::Double(parse_double(trimmed).ok_or_else(|| invalid(lexical, self))?)
            }
            AtomicType::Date => AtomicValue::Date(DateValue::parse(lexical)?),
            AtomicType::DateTime => AtomicValue::DateTime(DateTimeValue::parse(lexical)?),
            AtomicType::Time => AtomicValue::Time(TimeValue::parse(lexical)?),
            AtomicType::Duration => AtomicValue::Duration(DurationValue::parse(lexical)?),
            AtomicType::DayTimeDuration => {
                AtomicValue::DayTimeDuration(DurationValue::parse_day_time(lexical)?)
            }
            AtomicType::YearMonthDuration => {
                AtomicValue::YearMonthDuration(DurationValue::parse_year_month(lexical)?)
            }
            AtomicType::QName => {
                let (prefix, local) = match trimmed.split_once(':') {
                    Some((p, l)) => (Some(p.to_string()), l),
                    None => (None, trimmed),
                };
                if !is_nc_name(local) || prefix.as_deref().is_some_and(|p| !is_nc_name(p)) {
                    return Err(invalid(lexical, self));
                }
                AtomicValue::QName(QNameValue {
                    prefix,
                    namespace: None,
                    local: local.to_string(),
                })
            }
            AtomicType::Base64Binary => {
                let compact: String = lexical.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|_| invalid(lexical, self))?;
                AtomicValue::Base64Binary(bytes)
            }
            AtomicType::AnyAtomic => AtomicValue::UntypedAtomic(lexical.to_string()),
        };
        Ok(value)
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn invalid(lexical: &str, target: &AtomicType) -> MetapathError {
    MetapathError::invalid_value(
        codes::FORG0001,
        format!("'{}' is not a valid lexical form of {}", lexical, target.name()),
    )
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_integer(trimmed: &str, lexical: &str) -> Result<i64, MetapathError> {
    let digits = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(lexical, &AtomicType::Integer));
    }
    trimmed
        .strip_prefix('+')
        .unwrap_or(trimmed)
        .parse()
        .map_err(|_| MetapathError::overflow())
}

fn parse_decimal(trimmed: &str, lexical: &str) -> Result<Decimal, MetapathError> {
    let body = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
    let valid = !body.is_empty()
        && body != "."
        && body.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && body.bytes().filter(|&b| b == b'.').count() <= 1;
    if !valid {
        return Err(invalid(lexical, &AtomicType::Decimal));
    }
    trimmed
        .strip_prefix('+')
        .unwrap_or(trimmed)
        .parse::<Decimal>()
        .map_err(|_| MetapathError::overflow())
}

/// Parses the XPath double lexical space, which differs from Rust's in the
/// spelling of the special values.
pub(crate) fn parse_double(s: &str) -> Option<f64> {
    match s {
        "INF" | "+INF" => return Some(f64::INFINITY),
        "-INF" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }
    let plausible = !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !plausible {
        return None;
    }
    s.parse().ok()
}

/// Converts a double to a decimal, failing for NaN and the infinities.
pub(crate) fn double_to_decimal(d: f64) -> Result<Decimal, MetapathError> {
    if !d.is_finite() {
        return Err(MetapathError::invalid_cast(
            codes::FOCA0002,
            format_double(d),
            "xs:decimal",
        ));
    }
    Decimal::from_f64(d).ok_or_else(|| {
        MetapathError::arithmetic(codes::FOCA0002, "Value out of range for xs:decimal")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_canonical_forms() {
        assert_eq!(format_double(1.0), "1");
        assert_eq!(format_double(3.5), "3.5");
        assert_eq!(format_double(1e7), "1.0E7");
        assert_eq!(format_double(1.5e-7), "1.5E-7");
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::NEG_INFINITY), "-INF");
        assert_eq!(format_double(-0.0), "-0");
    }

    #[test]
    fn test_decimal_canonical_forms() {
        assert_eq!(format_decimal(&Decimal::new(3500, 3)), "3.5");
        assert_eq!(format_decimal(&Decimal::new(0, 2)), "0");
        assert_eq!(format_decimal(&Decimal::new(100, 0)), "100");
    }

    #[test]
    fn test_parse_lexical_forms() {
        assert_eq!(AtomicType::Integer.parse(" +42 ").unwrap(), AtomicValue::Integer(42));
        assert!(AtomicType::Integer.parse("4.2").is_err());
        assert_eq!(AtomicType::Boolean.parse("1").unwrap(), AtomicValue::Boolean(true));
        assert!(AtomicType::Boolean.parse("yes").is_err());
        assert_eq!(
            AtomicType::Token.parse("  a   b ").unwrap(),
            AtomicValue::Token("a b".into())
        );
        assert!(AtomicType::NcName.parse("a:b").is_err());
        assert!(AtomicType::Double.parse("inf").is_err());
        assert!(AtomicType::PositiveInteger.parse("0").is_err());
        let err = AtomicType::Decimal.parse("1e3").unwrap_err();
        assert_eq!(err.code(), codes::FORG0001);
    }

    #[test]
    fn test_derivation() {
        assert!(AtomicType::Decimal.is_instance(&AtomicValue::Integer(1)));
        assert!(!AtomicType::Integer.is_instance(&AtomicValue::Decimal(Decimal::ONE)));
        assert!(AtomicType::String.is_instance(&AtomicValue::NcName("a".into())));
        assert!(!AtomicType::NonNegativeInteger.is_instance(&AtomicValue::Integer(-1)));
        assert!(AtomicType::AnyAtomic.is_instance(&AtomicValue::Boolean(false)));
    }

    #[test]
    fn test_effective_boolean_value() {
        assert!(!AtomicValue::Double(f64::NAN).effective_boolean_value().unwrap());
        assert!(AtomicValue::from("x").effective_boolean_value().unwrap());
        let date = AtomicType::Date.parse("2020-01-01").unwrap();
        assert_eq!(date.effective_boolean_value().unwrap_err().code(), codes::FORG0006);
    }
}
