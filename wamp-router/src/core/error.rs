use anyhow::Error;
use thiserror::Error;

use crate::core::uri::{
    InvalidUri,
    Uri,
};

/// A basic error that occurs while processing a WAMP message.
#[derive(Debug, Error)]
pub enum BasicError {
    /// A generic resource was not found.
    ///
    /// WAMP defines standard URIs for not finding specific resource types. This error should only
    /// be used when the standard URI cannot be used.
    #[error("{0}")]
    NotFound(String),
    /// An invalid argument was passed.
    #[error("{0}")]
    InvalidArgument(String),
    /// The operation is not allowed based on process configuration.
    #[error("{0}")]
    NotAllowed(String),
    /// The operation is not allowed based on user permissions.
    #[error("{0}")]
    PermissionDenied(String),
    /// Some internal error occurred.
    ///
    /// Should only be used when there is no other error variant that describes the error, since
    /// the message is very vague and not very useful for debugging.
    #[error("{0}")]
    Internal(String),
}

impl BasicError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotAllowed(_) => "not_allowed",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Internal(_) => "internal",
        }
    }
}

/// An interaction error that occurs while processing a WAMP message.
///
/// Interaction errors are clearly defined in the WAMP standard and are reserved for errors that
/// peers must be able to parse easily.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// The incoming message violates the WAMP protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The procedure being called does not exist.
    #[error("no such procedure")]
    NoSuchProcedure,
    /// The procedure being registered already exists.
    #[error("procedure already exists")]
    ProcedureAlreadyExists,
    /// The registration being referenced does not exist.
    #[error("no such registration")]
    NoSuchRegistration,
    /// The subscription being referenced does not exist.
    #[error("no such subscription")]
    NoSuchSubscription,
    /// The realm being referenced does not exist.
    #[error("no such realm")]
    NoSuchRealm,
    /// The role being referenced does not exist.
    #[error("no such role")]
    NoSuchRole,
    /// The call was canceled before it produced a result.
    #[error("canceled")]
    Canceled,
    /// The call did not produce a result before its deadline.
    #[error("timeout")]
    Timeout,
}

impl InteractionError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::NoSuchProcedure => "no_such_procedure",
            Self::ProcedureAlreadyExists => "procedure_already_exists",
            Self::NoSuchRegistration => "no_such_registration",
            Self::NoSuchSubscription => "no_such_subscription",
            Self::NoSuchRealm => "no_such_realm",
            Self::NoSuchRole => "no_such_role",
            Self::Canceled => "canceled",
            Self::Timeout => "timeout",
        }
    }
}

/// The `wamp.error.*` URI communicating the given error to a peer.
pub fn uri_for_error(error: &Error) -> Uri {
    if error.is::<InvalidUri>() {
        Uri::from_known("wamp.error.invalid_uri")
    } else if let Some(error) = error.downcast_ref::<BasicError>() {
        Uri::from_known(format!("wamp.error.{}", error.uri_component()))
    } else if let Some(error) = error.downcast_ref::<InteractionError>() {
        Uri::from_known(format!("wamp.error.{}", error.uri_component()))
    } else {
        Uri::from_known("wamp.error.unknown_error")
    }
}

/// Whether the error is fatal to the session that caused it.
///
/// Fatal errors are answered with ABORT; all other errors are answered with
/// an ERROR frame scoped to the offending request, or dropped when the
/// request did not ask for a response.
pub fn error_is_fatal(error: &Error) -> bool {
    matches!(
        error.downcast_ref::<InteractionError>(),
        Some(InteractionError::ProtocolViolation(_))
    ) || matches!(
        error.downcast_ref::<BasicError>(),
        Some(BasicError::Internal(_))
    )
}

#[cfg(test)]
mod error_test {
    use crate::core::{
        error::{
            BasicError,
            InteractionError,
            uri_for_error,
        },
        uri::InvalidUri,
    };

    #[test]
    fn maps_errors_to_uris() {
        assert_eq!(
            uri_for_error(&InteractionError::NoSuchProcedure.into()).as_ref(),
            "wamp.error.no_such_procedure"
        );
        assert_eq!(
            uri_for_error(&InteractionError::Timeout.into()).as_ref(),
            "wamp.error.timeout"
        );
        assert_eq!(
            uri_for_error(&BasicError::InvalidArgument("bad".to_owned()).into()).as_ref(),
            "wamp.error.invalid_argument"
        );
        assert_eq!(
            uri_for_error(&InvalidUri.into()).as_ref(),
            "wamp.error.invalid_uri"
        );
        assert_eq!(
            uri_for_error(&anyhow::Error::msg("mystery")).as_ref(),
            "wamp.error.unknown_error"
        );
    }
}
