/// Errors that escape the session subsystem and should fail the request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The [`SessionConfig`](crate::SessionConfig) given to the factory is unusable.
    #[error("invalid session configuration: {0}")]
    InvalidConfig(&'static str),

    /// The cache store could not be reached or failed to execute an operation.
    /// Proceeding without it would silently drop session writes, so this is never recovered.
    #[error("the session cache store is unavailable: {0}")]
    CacheUnavailable(#[source] anyhow::Error),

    /// The session data could not be encoded into its storage format.
    #[error("failed to encode session data: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// A signed token was tampered with, malformed, or too old.
///
/// The cause is deliberately not reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid or expired signature")]
pub struct InvalidSignature;

/// A stored session payload could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DeserializationFailure {
    /// The payload is not a valid encoding of a session data map.
    #[error("malformed session payload: {0}")]
    Malformed(#[from] rmp_serde::decode::Error),

    /// A valid session data map was followed by more bytes.
    #[error("{0} trailing bytes after session payload")]
    TrailingData(usize),
}

mod expect_impl_error {
    trait ExpectImplError: std::error::Error {}

    impl ExpectImplError for super::Error {}
    impl ExpectImplError for super::InvalidSignature {}
    impl ExpectImplError for super::DeserializationFailure {}
}
