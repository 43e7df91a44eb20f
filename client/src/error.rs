//! Error taxonomy surfaced by the client stores.
//!
//! Every store keeps a single current failure (not a history); a new command
//! on the same store clears the previous one before attempting again. All
//! variants render as human-readable messages for the UI layer.

use thiserror::Error;

/// A failure surfaced by a store operation.
///
/// Covers both local guard rejections (duplicate booking, non-admin
/// mutation) and failures reported by the external API. The client-side
/// authorization variants are UX guards only; the server re-enforces them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreFailure {
    /// The API was unreachable or returned a malformed body.
    #[error("could not reach the server: {0}")]
    Network(String),

    /// Login was rejected.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The stored bearer token was rejected by the server.
    #[error("your session has expired, please log in again")]
    InvalidToken,

    /// The operation requires an authenticated session.
    #[error("you must be logged in")]
    Unauthenticated,

    /// The current session is not allowed to perform the operation.
    #[error("{0}")]
    Forbidden(String),

    /// A request field was missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The username or email is already registered.
    #[error("{0}")]
    DuplicateIdentity(String),

    /// An active booking for this (user, event) pair already exists.
    #[error("you have already booked this event")]
    DuplicateBooking,

    /// The referenced event or booking does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The API answered with an unexpected status.
    #[error("server error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the response body
        message: String,
    },

    /// A store runtime error (shutdown, settlement timeout). Not part of the
    /// domain taxonomy, but surfaced the same way.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreFailure {
    /// Failure for a mutation that requires the admin role.
    #[must_use]
    pub fn admin_required() -> Self {
        Self::Forbidden("only administrators can manage events".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(
            StoreFailure::DuplicateBooking.to_string(),
            "you have already booked this event"
        );
        assert_eq!(
            StoreFailure::Network("connection refused".to_string()).to_string(),
            "could not reach the server: connection refused"
        );
        assert_eq!(
            StoreFailure::Api {
                status: 502,
                message: "bad gateway".to_string()
            }
            .to_string(),
            "server error (502): bad gateway"
        );
    }
}
