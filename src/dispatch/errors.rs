use serde::Serialize;
use thiserror::Error;

use crate::game::BlockReason;
use crate::webtiles::TransportError;

/// Stable, serialisable error codes handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    ConnectionError,
    AuthError,
    ConnectionLost,
    Timeout,
    #[serde(rename = "UIBlocked")]
    UiBlocked,
    SessionEnded,
    InvalidAction,
    ServerRejected,
    PolicyDenied,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ConnectionError => "ConnectionError",
            ErrorCode::AuthError => "AuthError",
            ErrorCode::ConnectionLost => "ConnectionLost",
            ErrorCode::Timeout => "Timeout",
            ErrorCode::UiBlocked => "UIBlocked",
            ErrorCode::SessionEnded => "SessionEnded",
            ErrorCode::InvalidAction => "InvalidAction",
            ErrorCode::ServerRejected => "ServerRejected",
            ErrorCode::PolicyDenied => "PolicyDenied",
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("cannot connect: {0}")]
    Connection(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("timed out after {waited_ms}ms waiting for {action} to settle")]
    Timeout { action: &'static str, waited_ms: u64 },
    #[error("blocked: {0}")]
    UiBlocked(BlockReason),
    #[error("the game session has ended ({0})")]
    SessionEnded(String),
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("the server did not accept {0}; nothing happened")]
    ServerRejected(&'static str),
    #[error("{0}")]
    PolicyDenied(String),
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::Connection(_) => ErrorCode::ConnectionError,
            DispatchError::Auth(_) => ErrorCode::AuthError,
            DispatchError::ConnectionLost(_) => ErrorCode::ConnectionLost,
            DispatchError::Timeout { .. } => ErrorCode::Timeout,
            DispatchError::UiBlocked(_) => ErrorCode::UiBlocked,
            DispatchError::SessionEnded(_) => ErrorCode::SessionEnded,
            DispatchError::InvalidAction(_) => ErrorCode::InvalidAction,
            DispatchError::ServerRejected(_) => ErrorCode::ServerRejected,
            DispatchError::PolicyDenied(_) => ErrorCode::PolicyDenied,
        }
    }
}

impl From<TransportError> for DispatchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect { .. } => DispatchError::Connection(err.to_string()),
            TransportError::Auth(reason) => DispatchError::Auth(reason),
            TransportError::ConnectionLost(reason) => DispatchError::ConnectionLost(reason),
            TransportError::Timeout(what) => DispatchError::Timeout {
                action: what,
                waited_ms: 0,
            },
        }
    }
}

/// Error half of a capability response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&DispatchError> for ErrorInfo {
    fn from(err: &DispatchError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_to_wire_names() {
        assert_eq!(serde_json::to_value(ErrorCode::UiBlocked).unwrap(), "UIBlocked");
        assert_eq!(serde_json::to_value(ErrorCode::PolicyDenied).unwrap(), "PolicyDenied");
        assert_eq!(ErrorCode::UiBlocked.as_str(), "UIBlocked");
    }

    #[test]
    fn transport_errors_map_to_codes() {
        let refused: DispatchError = TransportError::Connect {
            url: "ws://127.0.0.1:1/socket".into(),
            reason: "refused".into(),
        }
        .into();
        assert_eq!(refused.code(), ErrorCode::ConnectionError);
        let auth: DispatchError = TransportError::Auth("bad password".into()).into();
        assert_eq!(auth.code(), ErrorCode::AuthError);
        let info = ErrorInfo::from(&DispatchError::UiBlocked(BlockReason::Paginated));
        assert_eq!(info.code, ErrorCode::UiBlocked);
        assert!(info.message.contains("--more--"));
    }
}
