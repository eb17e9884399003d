use std::fmt;

use thiserror::Error;

/// A standard error code such as `FOTY0012` or `XPST0017`.
///
/// Codes follow the XPath and XQuery Functions 3.1 families. Downstream
/// tooling matches on the rendered form, so it must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    family: &'static str,
    number: u16,
}

impl ErrorCode {
    pub const fn new(family: &'static str, number: u16) -> Self {
        Self { family, number }
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    pub fn number(&self) -> u16 {
        self.number
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04}", self.family, self.number)
    }
}

pub mod codes {
    use super::ErrorCode;

    pub const XPST0003: ErrorCode = ErrorCode::new("XPST", 3);
    pub const XPST0008: ErrorCode = ErrorCode::new("XPST", 8);
    pub const XPST0017: ErrorCode = ErrorCode::new("XPST", 17);
    pub const XPST0051: ErrorCode = ErrorCode::new("XPST", 51);
    pub const XPST0081: ErrorCode = ErrorCode::new("XPST", 81);

    pub const XPTY0004: ErrorCode = ErrorCode::new("XPTY", 4);
    pub const XPTY0018: ErrorCode = ErrorCode::new("XPTY", 18);
    pub const XPTY0019: ErrorCode = ErrorCode::new("XPTY", 19);
    pub const XPTY0020: ErrorCode = ErrorCode::new("XPTY", 20);

    pub const XPDY0002: ErrorCode = ErrorCode::new("XPDY", 2);
    pub const XPDY0050: ErrorCode = ErrorCode::new("XPDY", 50);
    pub const XQDY0137: ErrorCode = ErrorCode::new("XQDY", 137);

    pub const FOAP0001: ErrorCode = ErrorCode::new("FOAP", 1);
    pub const FOAR0001: ErrorCode = ErrorCode::new("FOAR", 1);
    pub const FOAR0002: ErrorCode = ErrorCode::new("FOAR", 2);
    pub const FOAY0001: ErrorCode = ErrorCode::new("FOAY", 1);
    pub const FOAY0002: ErrorCode = ErrorCode::new("FOAY", 2);
    pub const FOCA0002: ErrorCode = ErrorCode::new("FOCA", 2);
    pub const FOCH0001: ErrorCode = ErrorCode::new("FOCH", 1);
    pub const FOCH0002: ErrorCode = ErrorCode::new("FOCH", 2);
    pub const FODT0001: ErrorCode = ErrorCode::new("FODT", 1);
    pub const FODT0002: ErrorCode = ErrorCode::new("FODT", 2);
    pub const FODT0003: ErrorCode = ErrorCode::new("FODT", 3);
    pub const FOER0000: ErrorCode = ErrorCode::new("FOER", 0);
    pub const FOJS0003: ErrorCode = ErrorCode::new("FOJS", 3);
    pub const FOJS0005: ErrorCode = ErrorCode::new("FOJS", 5);
    pub const FONS0004: ErrorCode = ErrorCode::new("FONS", 4);
    pub const FONS0005: ErrorCode = ErrorCode::new("FONS", 5);
    pub const FORG0001: ErrorCode = ErrorCode::new("FORG", 1);
    pub const FORG0002: ErrorCode = ErrorCode::new("FORG", 2);
    pub const FORG0003: ErrorCode = ErrorCode::new("FORG", 3);
    pub const FORG0004: ErrorCode = ErrorCode::new("FORG", 4);
    pub const FORG0005: ErrorCode = ErrorCode::new("FORG", 5);
    pub const FORG0006: ErrorCode = ErrorCode::new("FORG", 6);
    pub const FORG0008: ErrorCode = ErrorCode::new("FORG", 8);
    pub const FORX0001: ErrorCode = ErrorCode::new("FORX", 1);
    pub const FORX0002: ErrorCode = ErrorCode::new("FORX", 2);
    pub const FORX0003: ErrorCode = ErrorCode::new("FORX", 3);
    pub const FORX0004: ErrorCode = ErrorCode::new("FORX", 4);
    pub const FOTY0012: ErrorCode = ErrorCode::new("FOTY", 12);
    pub const FOTY0013: ErrorCode = ErrorCode::new("FOTY", 13);
    pub const FOTY0014: ErrorCode = ErrorCode::new("FOTY", 14);
    pub const FOTY0015: ErrorCode = ErrorCode::new("FOTY", 15);

    /// Evaluation exceeded the configured recursion depth.
    pub const MPDY0001: ErrorCode = ErrorCode::new("MPDY", 1);
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetapathError {
    #[error("[XPST0003] Syntax error at offset {position} near '{token}' in '{expression}': {message}")]
    Syntax {
        expression: String,
        position: usize,
        token: String,
        message: String,
    },

    #[error("[{code}] {message}")]
    StaticAnalysis { code: ErrorCode, message: String },

    #[error("[{code}] Type error: {message}")]
    Type { code: ErrorCode, message: String },

    #[error("[{code}] Cardinality error: {message}")]
    Cardinality { code: ErrorCode, message: String },

    #[error("[{code}] Arithmetic error: {message}")]
    Arithmetic { code: ErrorCode, message: String },

    #[error("[{code}] Invalid value: {message}")]
    InvalidValue { code: ErrorCode, message: String },

    #[error("[{code}] Cannot cast {from} to {to}")]
    InvalidCast {
        code: ErrorCode,
        from: String,
        to: String,
    },

    #[error("[XPST0008] Variable '${name}' is not bound")]
    UndefinedVariable { name: String },

    #[error("[XPDY0002] Context item is required but not set")]
    NoContextItem,

    #[error("[FOAY0001] Array index {index} out of bounds (size: {size})")]
    ArrayIndexOutOfBounds { index: i64, size: usize },

    #[error("[{code}] {message}")]
    Function { code: ErrorCode, message: String },

    #[error("[MPDY0001] Recursion depth limit of {limit} exceeded")]
    RecursionLimitExceeded { limit: usize },
}

impl MetapathError {
    /// The standard error code reported for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            MetapathError::Syntax { .. } => codes::XPST0003,
            MetapathError::StaticAnalysis { code, .. }
            | MetapathError::Type { code, .. }
            | MetapathError::Cardinality { code, .. }
            | MetapathError::Arithmetic { code, .. }
            | MetapathError::InvalidValue { code, .. }
            | MetapathError::InvalidCast { code, .. }
            | MetapathError::Function { code, .. } => *code,
            MetapathError::UndefinedVariable { .. } => codes::XPST0008,
            MetapathError::NoContextItem => codes::XPDY0002,
            MetapathError::ArrayIndexOutOfBounds { .. } => codes::FOAY0001,
            MetapathError::RecursionLimitExceeded { .. } => codes::MPDY0001,
        }
    }

    /// `true` for errors raised while compiling, before any data is touched.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            MetapathError::Syntax { .. } | MetapathError::StaticAnalysis { .. }
        )
    }

    pub fn is_cardinality(&self) -> bool {
        matches!(self, MetapathError::Cardinality { .. })
    }

    pub fn static_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::StaticAnalysis {
            code,
            message: message.into(),
        }
    }

    pub fn type_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Type {
            code,
            message: message.into(),
        }
    }

    pub fn cardinality(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Cardinality {
            code,
            message: message.into(),
        }
    }

    pub fn arithmetic(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Arithmetic {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_value(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_cast(code: ErrorCode, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidCast {
            code,
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn function(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Function {
            code,
            message: message.into(),
        }
    }

    pub fn division_by_zero() -> Self {
        Self::arithmetic(codes::FOAR0001, "Division by zero")
    }

    pub fn overflow() -> Self {
        Self::arithmetic(codes::FOAR0002, "Numeric operation overflow/underflow")
    }

    /// Atomization of a node whose definition declares no simple value.
    pub fn no_typed_value(kind: impl fmt::Display, path: impl fmt::Display) -> Self {
        Self::type_error(
            codes::FOTY0012,
            format!("The {} node item at path '{}' has no typed value", kind, path),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_rendering() {
        assert_eq!(codes::FOTY0012.to_string(), "FOTY0012");
        assert_eq!(codes::FOER0000.to_string(), "FOER0000");
        assert_eq!(codes::XQDY0137.to_string(), "XQDY0137");
    }

    #[test]
    fn test_variant_codes() {
        assert_eq!(MetapathError::division_by_zero().code(), codes::FOAR0001);
        assert_eq!(MetapathError::NoContextItem.code(), codes::XPDY0002);
        let err = MetapathError::no_typed_value("assembly", "/catalog[1]");
        assert_eq!(err.code(), codes::FOTY0012);
        assert_eq!(
            err.to_string(),
            "[FOTY0012] Type error: The assembly node item at path '/catalog[1]' has no typed value"
        );
        assert!(
            MetapathError::Syntax {
                expression: "1 +".into(),
                position: 2,
                token: "+".into(),
                message: "unexpected input".into(),
            }
            .is_static()
        );
    }
}
