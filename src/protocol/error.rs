//! Numbered protocol errors.
//!
//! The numeric codes are part of the wire contract. Clients in the field
//! switch on them, so existing values are never renumbered.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors reported to clients through the `Error` response field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ServerError {
    /// Unexpected internal fault (storage failure, bug).
    #[error("server failure")]
    ServerFailure,

    /// Device info sent with `Get-Cookie` is not valid.
    #[error("unsupported device")]
    UnsupportedDevice,

    /// Registration code is unknown.
    #[error("invalid registration code")]
    InvalidRegCode,

    /// Request doesn't follow the strict request format.
    #[error("malformed request")]
    MalformedRequest,

    /// Unregistered user has used up the lookup allowance.
    #[error("lookup limit reached")]
    LookupLimitReached,

    /// Field name unknown to the server.
    #[error("invalid request")]
    InvalidRequest,

    /// Field takes no argument but one was sent.
    #[error("unexpected request argument")]
    UnexpectedRequestArgument,

    /// Field requires an argument but none was sent.
    #[error("request argument missing")]
    RequestArgumentMissing,

    /// `Protocol-Version` is not the supported one.
    #[error("invalid protocol version")]
    InvalidProtocolVersion,

    /// Cookie was never issued by this server.
    #[error("invalid cookie")]
    InvalidCookie,

    /// User behind the cookie or registration code is disabled.
    #[error("user disabled")]
    UserDisabled,

    /// Operator kill-switch telling the client to upgrade.
    #[error("force upgrade")]
    ForceUpgrade,

    /// Requested language is unsupported or has no database right now.
    #[error("language not available")]
    LangNotAvailable,
}

impl ServerError {
    /// Wire code of this error.
    pub fn code(self) -> u32 {
        match self {
            ServerError::ServerFailure => 1,
            ServerError::UnsupportedDevice => 2,
            ServerError::InvalidRegCode => 3,
            ServerError::MalformedRequest => 4,
            ServerError::LookupLimitReached => 5,
            ServerError::InvalidRequest => 6,
            ServerError::UnexpectedRequestArgument => 7,
            ServerError::RequestArgumentMissing => 8,
            ServerError::InvalidProtocolVersion => 9,
            ServerError::InvalidCookie => 10,
            ServerError::UserDisabled => 11,
            ServerError::ForceUpgrade => 12,
            ServerError::LangNotAvailable => 13,
        }
    }

    /// Stable lowercase name, used as a metrics label.
    pub fn name(self) -> &'static str {
        match self {
            ServerError::ServerFailure => "server_failure",
            ServerError::UnsupportedDevice => "unsupported_device",
            ServerError::InvalidRegCode => "invalid_reg_code",
            ServerError::MalformedRequest => "malformed_request",
            ServerError::LookupLimitReached => "lookup_limit_reached",
            ServerError::InvalidRequest => "invalid_request",
            ServerError::UnexpectedRequestArgument => "unexpected_request_argument",
            ServerError::RequestArgumentMissing => "request_argument_missing",
            ServerError::InvalidProtocolVersion => "invalid_protocol_version",
            ServerError::InvalidCookie => "invalid_cookie",
            ServerError::UserDisabled => "user_disabled",
            ServerError::ForceUpgrade => "force_upgrade",
            ServerError::LangNotAvailable => "lang_not_available",
        }
    }

    /// Inverse of [`ServerError::code`], used by the client-side decoder.
    pub fn from_code(code: u32) -> Option<Self> {
        let err = match code {
            1 => ServerError::ServerFailure,
            2 => ServerError::UnsupportedDevice,
            3 => ServerError::InvalidRegCode,
            4 => ServerError::MalformedRequest,
            5 => ServerError::LookupLimitReached,
            6 => ServerError::InvalidRequest,
            7 => ServerError::UnexpectedRequestArgument,
            8 => ServerError::RequestArgumentMissing,
            9 => ServerError::InvalidProtocolVersion,
            10 => ServerError::InvalidCookie,
            11 => ServerError::UserDisabled,
            12 => ServerError::ForceUpgrade,
            13 => ServerError::LangNotAvailable,
            _ => return None,
        };
        Some(err)
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Storage failure while handling request");
        ServerError::ServerFailure
    }
}

/// Result type for request processing.
pub type ProtocolResult<T> = Result<T, ServerError>;
