// src/error.rs
use metaschema_constraint::ConstraintError;
use metaschema_metapath::MetapathError;
use thiserror::Error;

/// Every failure the facade can report.
#[derive(Error, Debug, Clone)]
pub enum MetaschemaError {
    #[error("Metapath evaluation failed: {0}")]
    Metapath(#[from] MetapathError),

    #[error("Constraint processing failed: {0}")]
    Constraint(#[from] ConstraintError),
}

impl MetaschemaError {
    /// The standard error code when the failure came from Metapath.
    pub fn code(&self) -> Option<metaschema_metapath::ErrorCode> {
        match self {
            MetaschemaError::Metapath(e) => Some(e.code()),
            MetaschemaError::Constraint(ConstraintError::Metapath { source, .. }) => {
                Some(source.code())
            }
            MetaschemaError::Constraint(_) => None,
        }
    }
}
