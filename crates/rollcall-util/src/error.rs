//! Error types for rollcall

use thiserror::Error;

use crate::AttendanceTypeId;

/// Core error type for rollcall operations
#[derive(Debug, Error)]
pub enum RollcallError {
    #[error("Unknown attendance type: {0}")]
    UnknownAttendanceType(AttendanceTypeId),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl RollcallError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RollcallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = RollcallError::UnknownAttendanceType("overtime".into());
        assert_eq!(err.to_string(), "Unknown attendance type: overtime");

        let err = RollcallError::validation("empty command");
        assert_eq!(err.to_string(), "Validation error: empty command");
    }
}
