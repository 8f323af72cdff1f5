//! MessagePack encoding of session data, the format stored in the cache.

use crate::error::DeserializationFailure;
use crate::SessionValue;
use std::collections::BTreeMap;

/// The key/value mapping held by a session.
pub type SessionData = BTreeMap<String, SessionValue>;

/// Encode session data for storage.
pub fn serialize(data: &SessionData) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec(data)
}

/// Decode stored session data.
///
/// Fails if the payload is not exactly one encoded mapping, including when a valid mapping is followed by trailing bytes.
pub fn try_deserialize(bytes: &[u8]) -> Result<SessionData, DeserializationFailure> {
    let mut remaining = bytes;
    let data = rmp_serde::from_read(&mut remaining)?;
    if remaining.is_empty() {
        Ok(data)
    } else {
        Err(DeserializationFailure::TrailingData(remaining.len()))
    }
}
