use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistError {
    #[error("Write failure: {0}")]
    WriteFailure(String),

    #[error("Version conflict for document '{id}': expected {expected:?}, found {actual:?}")]
    VersionConflict {
        id: String,
        expected: Option<i64>,
        actual: Option<i64>,
    },

    #[error("Document '{0}' not found")]
    DocumentNotFound(String),

    #[error("Document not saved: {0}")]
    DocumentNotSaved(String),

    #[error("Attribute '{0}' not found in model '{1}'")]
    AttributeNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PersistError {
    /// Returns `true` when the store did not confirm a write.
    ///
    /// Caller errors (unknown attribute, unsaved record) are raised before any
    /// I/O and are not write failures.
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            Self::WriteFailure(_) | Self::VersionConflict { .. } | Self::DocumentNotFound(_)
        )
    }

    /// Returns `true` for optimistic-concurrency conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
