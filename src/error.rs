//! Error types for call signaling

/// Result type alias using the signaling Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating a call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Local capture failed, was denied, or was never acquired
    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    /// A message referenced a session that does not exist
    #[error("No active session")]
    NoActiveSession,

    /// Inbound offer (or outbound call) while a session is live
    #[error("Busy: a session is already active")]
    Busy,

    /// Answer/candidate/reject arriving in a state that cannot accept it
    #[error("Negotiation conflict: {0}")]
    NegotiationConflict(String),

    /// Signal channel send/receive failure
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Undecodable payload or missing field
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Failure reported by the media endpoint or its connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Continuation of a session that has been torn down
    #[error("Session was cancelled")]
    Cancelled,

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Check if the offending message was simply discarded
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::NoActiveSession
                | Error::Busy
                | Error::NegotiationConflict(_)
                | Error::MalformedMessage(_)
        )
    }

    /// Wire reason used when a rejection is announced to the caller
    pub fn reject_reason(&self) -> Option<&'static str> {
        match self {
            Error::Busy => Some("busy"),
            Error::MediaUnavailable(_) => Some("media-unavailable"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MalformedMessage("missing type".to_string());
        assert_eq!(err.to_string(), "Malformed message: missing type");
        assert_eq!(Error::Busy.to_string(), "Busy: a session is already active");
    }

    #[test]
    fn test_is_protocol_error() {
        assert!(Error::Busy.is_protocol_error());
        assert!(Error::NoActiveSession.is_protocol_error());
        assert!(Error::MalformedMessage("x".into()).is_protocol_error());
        assert!(!Error::TransportError("x".into()).is_protocol_error());
        assert!(!Error::Cancelled.is_protocol_error());
    }

    #[test]
    fn test_reject_reason() {
        assert_eq!(Error::Busy.reject_reason(), Some("busy"));
        assert_eq!(
            Error::MediaUnavailable("denied".into()).reject_reason(),
            Some("media-unavailable")
        );
        assert_eq!(Error::NoActiveSession.reject_reason(), None);
    }
}
