use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The SCRAM mechanism error cases.
///
/// `Malformed` and `InvalidArgument` indicate protocol or programming errors
/// at the boundary that detects them. `CapacityExceeded` is transient and
/// retryable. `UnknownUser` and `AuthenticationFailed` are terminal for the
/// attempt and deliberately share one wire shape (see [`Error::wire_reason`]).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A message wasn't formatted as required. `Kind` contains further
    /// information.
    #[error("malformed message: {0}")]
    Malformed(#[from] Kind),
    /// The username has no credential record. Surfaced on the wire exactly
    /// like `AuthenticationFailed`.
    #[error("unknown user")]
    UnknownUser,
    /// The client proof did not verify against the stored key, or the server
    /// rejected the attempt.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// The server's signature could not be validated by the client. This
    /// usually means the server does not possess the server key for the
    /// credentials in use.
    #[error("server failed validation")]
    InvalidServer,
    /// A client-final or validation call referenced a token that is unknown
    /// or has expired. The client must restart from client-first.
    #[error("unknown or expired token")]
    UnknownToken,
    /// Too many handshakes are pending; the attempt was shed. Retry later.
    #[error("too many pending handshakes")]
    CapacityExceeded,
    /// A constructor was called with an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// The ways a received message can be malformed.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Kind {
    /// The transport base64 (or an embedded text field) did not decode.
    #[error("invalid encoding")]
    Encoding,
    /// The decoded message length did not match the fixed layout.
    #[error("invalid length")]
    Length,
    /// A delimiter byte was absent from its fixed offset.
    #[error("invalid delimiter")]
    Delimiter,
    /// An embedded nonce did not match the handshake it was checked against.
    #[error("nonce mismatch")]
    Nonce,
    /// The iteration count was outside the accepted range.
    #[error("iteration count out of range")]
    IterationCount,
}

impl Error {
    /// The opaque reason carried by an on-wire error payload (`"e=" + reason`).
    ///
    /// Unknown-user and failed-proof rejections map to the same reason so the
    /// wire response does not reveal which check failed; logs keep the
    /// distinction.
    pub fn wire_reason(&self) -> &'static str {
        match self {
            Error::CapacityExceeded => "no-resources",
            Error::UnknownUser | Error::AuthenticationFailed => "authentication-failed",
            Error::Malformed(_)
            | Error::InvalidServer
            | Error::UnknownToken
            | Error::InvalidArgument(_) => "invalid-encoding",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, Kind};

    #[test]
    fn unknown_user_and_bad_proof_are_indistinguishable_on_the_wire() {
        assert_eq!(
            Error::UnknownUser.wire_reason(),
            Error::AuthenticationFailed.wire_reason()
        );
    }

    #[test]
    fn capacity_keeps_its_own_reason() {
        assert_eq!(Error::CapacityExceeded.wire_reason(), "no-resources");
        assert_eq!(Error::Malformed(Kind::Length).wire_reason(), "invalid-encoding");
    }
}
