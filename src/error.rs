use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One record that failed validation during backup import or restore.
///
/// `index` is the record's position inside its collection as submitted, so a
/// caller can point at the exact offending entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub collection: String,
    pub index: usize,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.collection, self.index, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocDbErrorCode {
    Io,
    Encode,
    Decode,
    Validation,
    InvalidConfig,
    ImportRejected,
    BackupNotFound,
}

impl DocDbErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DocDbErrorCode::Io => "io",
            DocDbErrorCode::Encode => "encode",
            DocDbErrorCode::Decode => "decode",
            DocDbErrorCode::Validation => "validation",
            DocDbErrorCode::InvalidConfig => "invalid_config",
            DocDbErrorCode::ImportRejected => "import_rejected",
            DocDbErrorCode::BackupNotFound => "backup_not_found",
        }
    }
}

#[derive(Debug, Error)]
pub enum DocDbError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("import rejected: {} validation issue(s)", .errors.len())]
    ImportRejected { errors: Vec<ValidationIssue> },
    #[error("backup '{name}' not found")]
    BackupNotFound { name: String },
}

impl DocDbError {
    pub fn code(&self) -> DocDbErrorCode {
        match self {
            DocDbError::Io(_) => DocDbErrorCode::Io,
            DocDbError::Encode(_) => DocDbErrorCode::Encode,
            DocDbError::Decode(_) => DocDbErrorCode::Decode,
            DocDbError::Validation(_) => DocDbErrorCode::Validation,
            DocDbError::InvalidConfig { .. } => DocDbErrorCode::InvalidConfig,
            DocDbError::ImportRejected { .. } => DocDbErrorCode::ImportRejected,
            DocDbError::BackupNotFound { .. } => DocDbErrorCode::BackupNotFound,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Returns the full issue list when the error is an import/restore
    /// rejection; empty otherwise.
    pub fn validation_issues(&self) -> &[ValidationIssue] {
        match self {
            DocDbError::ImportRejected { errors } => errors,
            _ => &[],
        }
    }
}
