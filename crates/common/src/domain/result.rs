use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Failed to read telemetry: {0:#}")]
    ReadError(#[source] anyhow::Error),

    #[error("Failed to save telemetry event: {0:#}")]
    SaveError(#[source] anyhow::Error),

    #[error("Location lookup failed: {0}")]
    LocationLookupError(String),

    #[error("Failed to render dashboard: {0}")]
    RenderError(String),

    #[error("Failed to initialize cache: {0}")]
    CacheInitError(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

/// Storage rejected a field value it cannot represent in the target column.
#[derive(Error, Debug)]
#[error("invalid telemetry event: {0}")]
pub struct InvalidEventError(pub String);

/// Rolling back a failed transaction failed as well. The original failure is
/// kept as the source so both causes show up in the error chain.
#[derive(Error, Debug)]
#[error("failed to roll back transaction: {rollback}")]
pub struct TransactionRollbackError {
    pub rollback: String,
    #[source]
    pub cause: anyhow::Error,
}

impl DomainError {
    /// True when a save failed because storage rejected the event shape.
    pub fn is_invalid_event(&self) -> bool {
        match self {
            DomainError::SaveError(err) => err
                .chain()
                .any(|cause| cause.downcast_ref::<InvalidEventError>().is_some()),
            _ => false,
        }
    }

    /// True when a save failed and the rollback failed too.
    pub fn is_rollback_failure(&self) -> bool {
        match self {
            DomainError::SaveError(err) => err
                .chain()
                .any(|cause| cause.downcast_ref::<TransactionRollbackError>().is_some()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_event_is_detected_inside_save_error() {
        let err = DomainError::SaveError(InvalidEventError("bad ip".to_string()).into());
        assert!(err.is_invalid_event());
        assert!(!err.is_rollback_failure());
        assert!(err.to_string().contains("invalid telemetry event: bad ip"));
    }

    #[test]
    fn test_rollback_failure_reports_both_causes() {
        let err = DomainError::SaveError(
            TransactionRollbackError {
                rollback: "connection reset".to_string(),
                cause: anyhow::anyhow!("insert failed"),
            }
            .into(),
        );

        assert!(err.is_rollback_failure());
        let rendered = err.to_string();
        assert!(rendered.contains("connection reset"));
        assert!(rendered.contains("insert failed"));
    }

    #[test]
    fn test_invalid_event_under_rollback_failure_is_still_visible() {
        let err = DomainError::SaveError(
            TransactionRollbackError {
                rollback: "broken pipe".to_string(),
                cause: InvalidEventError("non utf8 city".to_string()).into(),
            }
            .into(),
        );

        assert!(err.is_invalid_event());
        assert!(err.is_rollback_failure());
    }

    #[test]
    fn test_read_error_is_not_a_save_failure() {
        let err = DomainError::ReadError(anyhow::anyhow!("timeout"));
        assert!(!err.is_invalid_event());
        assert!(!err.is_rollback_failure());
    }
}
