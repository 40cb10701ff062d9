//! Errors returned synchronously to the calling client.
//!
//! Anything that goes wrong after a request has been dispatched is not an
//! error from the client's point of view: it becomes a `Response` signal with
//! code 2 instead.

use chooser_core::ValidationError;

/// Errors a file chooser call can fail with before returning a request handle.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),
    #[error("unable to determine the app id of {sender}")]
    AppIdUnavailable { sender: String },
    #[error("request {id} already exists")]
    DuplicateRequest { id: String },
    #[error("backend unavailable: {0}")]
    Backend(anyhow::Error),
    #[error("failed to export request: {0}")]
    Export(anyhow::Error),
}

impl PortalError {
    /// Whether this error maps to the bus-level `InvalidArgument` error name.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::DuplicateRequest { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_preserved_verbatim() {
        let err: PortalError = ValidationError::new("name is empty")
            .prefixed("invalid filter")
            .prefixed("invalid filters")
            .into();
        assert!(err.is_invalid_argument());
        assert_eq!(
            err.to_string(),
            "invalid argument: invalid filters: invalid filter: name is empty"
        );
    }

    #[test]
    fn setup_failures_are_not_invalid_argument() {
        let err = PortalError::Backend(anyhow::anyhow!("no such name"));
        assert!(!err.is_invalid_argument());
        assert_eq!(err.to_string(), "backend unavailable: no such name");
    }
}
