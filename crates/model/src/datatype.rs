//! Declared data types of field and flag values.
use std::fmt;

/// The data type a field or flag definition declares for its value.
///
/// Values arrive from the binding layer in lexical form; the Metapath type
/// system owns the adapters that turn a lexical value into a typed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Token,
    NcName,
    Integer,
    NonNegativeInteger,
    PositiveInteger,
    Decimal,
    Boolean,
    Date,
    DateTime,
    DateWithTimezone,
    DateTimeWithTimezone,
    DayTimeDuration,
    YearMonthDuration,
    EmailAddress,
    Hostname,
    IpV4Address,
    IpV6Address,
    Uri,
    UriReference,
    Uuid,
    Base64,
    MarkupLine,
    MarkupMultiline,
}

impl DataType {
    pub const ALL: [DataType; 24] = [
        DataType::String,
        DataType::Token,
        DataType::NcName,
        DataType::Integer,
        DataType::NonNegativeInteger,
        DataType::PositiveInteger,
        DataType::Decimal,
        DataType::Boolean,
        DataType::Date,
        DataType::DateTime,
        DataType::DateWithTimezone,
        DataType::DateTimeWithTimezone,
        DataType::DayTimeDuration,
        DataType::YearMonthDuration,
        DataType::EmailAddress,
        DataType::Hostname,
        DataType::IpV4Address,
        DataType::IpV6Address,
        DataType::Uri,
        DataType::UriReference,
        DataType::Uuid,
        DataType::Base64,
        DataType::MarkupLine,
        DataType::MarkupMultiline,
    ];

    /// The preferred Metaschema name of this type, e.g. `date-time-with-timezone`.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Token => "token",
            DataType::NcName => "ncname",
            DataType::Integer => "integer",
            DataType::NonNegativeInteger => "non-negative-integer",
            DataType::PositiveInteger => "positive-integer",
            DataType::Decimal => "decimal",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::DateTime => "date-time",
            DataType::DateWithTimezone => "date-with-timezone",
            DataType::DateTimeWithTimezone => "date-time-with-timezone",
            DataType::DayTimeDuration => "day-time-duration",
            DataType::YearMonthDuration => "year-month-duration",
            DataType::EmailAddress => "email-address",
            DataType::Hostname => "hostname",
            DataType::IpV4Address => "ip-v4-address",
            DataType::IpV6Address => "ip-v6-address",
            DataType::Uri => "uri",
            DataType::UriReference => "uri-reference",
            DataType::Uuid => "uuid",
            DataType::Base64 => "base64",
            DataType::MarkupLine => "markup-line",
            DataType::MarkupMultiline => "markup-multiline",
        }
    }

    /// Looks a type up by its Metaschema name. Legacy upper-camel aliases such
    /// as `dateTime` and `NCName` are accepted as well.
    pub fn from_name(name: &str) -> Option<DataType> {
        let found = DataType::ALL.into_iter().find(|dt| dt.name() == name);
        if found.is_some() {
            return found;
        }
        match name {
            "NCName" => Some(DataType::NcName),
            "nonNegativeInteger" => Some(DataType::NonNegativeInteger),
            "positiveInteger" => Some(DataType::PositiveInteger),
            "dateTime" => Some(DataType::DateTime),
            "date-time-with-tz" | "dateTime-with-timezone" => Some(DataType::DateTimeWithTimezone),
            "dayTimeDuration" => Some(DataType::DayTimeDuration),
            "yearMonthDuration" => Some(DataType::YearMonthDuration),
            "email" => Some(DataType::EmailAddress),
            "uri-ref" => Some(DataType::UriReference),
            "base64Binary" => Some(DataType::Base64),
            _ => None,
        }
    }

    /// `true` for markup types, whose values are already rendered to plain text
    /// by the binding layer.
    pub fn is_markup(&self) -> bool {
        matches!(self, DataType::MarkupLine | DataType::MarkupMultiline)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for dt in DataType::ALL {
            assert_eq!(DataType::from_name(dt.name()), Some(dt));
        }
    }

    #[test]
    fn test_legacy_aliases() {
        assert_eq!(DataType::from_name("dateTime"), Some(DataType::DateTime));
        assert_eq!(DataType::from_name("NCName"), Some(DataType::NcName));
        assert_eq!(DataType::from_name("no-such-type"), None);
    }
}
