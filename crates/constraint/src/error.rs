use metaschema_metapath::MetapathError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ConstraintError {
    #[error("Metapath error in '{expression}': {source}")]
    Metapath {
        expression: String,
        #[source]
        source: MetapathError,
    },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid message template '{template}': {message}")]
    InvalidMessage { template: String, message: String },

    #[error("{message}")]
    KeyField { message: String },

    #[error("Unknown constraint level '{0}'")]
    InvalidLevel(String),

    #[error("Unknown data type '{0}'")]
    UnknownDataType(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl ConstraintError {
    /// Wraps a Metapath failure together with the expression that raised it.
    pub fn metapath(expression: impl Into<String>, source: MetapathError) -> Self {
        Self::Metapath {
            expression: expression.into(),
            source,
        }
    }

    pub fn key_field(message: impl Into<String>) -> Self {
        Self::KeyField {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ConstraintError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_metapath::codes;

    #[test]
    fn test_metapath_error_keeps_expression() {
        let err = ConstraintError::metapath("1 div 0", MetapathError::division_by_zero());
        let text = err.to_string();
        assert!(text.contains("'1 div 0'"));
        match err {
            ConstraintError::Metapath { source, .. } => assert_eq!(source.code(), codes::FOAR0001),
            other => panic!("Expected a Metapath error, found {:?}", other),
        }
    }
}
