use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("`{value}` is not a known {kind}")]
    UnknownCode { kind: &'static str, value: i64 },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unknown_code(kind: &'static str, value: i64) -> Self {
        Self::UnknownCode { kind, value }
    }
}
