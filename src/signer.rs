//! Timestamped signatures for cookie values.
//!
//! A signed token has the form `{value}.{timestamp}.{signature}`, where the timestamp is the
//! signing time in seconds since the unix epoch and the signature is a keyed blake3 hash of
//! `{value}.{timestamp}`. Timestamp and signature are base64url encoded without padding.

use crate::error::InvalidSignature;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::fmt::{Debug, Formatter};
use std::time::Duration;

const SEPARATOR: char = '.';

/// Signs values and verifies signed tokens.
///
/// The signing key is derived from a secret and a salt, so the same secret can be shared by
/// signers for different purposes without their tokens being interchangeable.
#[derive(Clone)]
#[allow(missing_copy_implementations)]
pub struct Signer {
    key: [u8; blake3::KEY_LEN],
}

impl Signer {
    /// Create a signer from a secret and a salt.
    pub fn new(secret: &[u8], salt: &str) -> Self {
        let context = format!("pvault-session {salt} signer");
        Self {
            key: blake3::derive_key(&context, secret),
        }
    }

    /// Sign `value` with the current time.
    pub fn sign(&self, value: &str) -> String {
        self.sign_at(value, Utc::now())
    }

    /// Sign `value`, embedding `now` as the signing time.
    pub fn sign_at(&self, value: &str, now: DateTime<Utc>) -> String {
        let timestamp = encode_timestamp(now.timestamp());
        let payload = format!("{value}{SEPARATOR}{timestamp}");
        let signature = self.signature(&payload);
        format!(
            "{payload}{SEPARATOR}{}",
            URL_SAFE_NO_PAD.encode(signature.as_bytes())
        )
    }

    /// Verify `token` against the current time and return the signed value.
    pub fn unsign(&self, token: &str, max_age: Duration) -> Result<String, InvalidSignature> {
        self.unsign_at(token, max_age, Utc::now())
    }

    /// Verify `token` and return the signed value.
    ///
    /// Fails if the signature does not match, or if the token was signed more than `max_age`
    /// before `now` or after `now`.
    pub fn unsign_at(
        &self,
        token: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, InvalidSignature> {
        let (payload, signature) = token.rsplit_once(SEPARATOR).ok_or(InvalidSignature)?;
        let signature: [u8; blake3::OUT_LEN] = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| InvalidSignature)?
            .try_into()
            .map_err(|_| InvalidSignature)?;
        // blake3::Hash compares in constant time.
        if blake3::Hash::from(signature) != self.signature(payload) {
            return Err(InvalidSignature);
        }

        let (value, timestamp) = payload.rsplit_once(SEPARATOR).ok_or(InvalidSignature)?;
        let timestamp = decode_timestamp(timestamp).ok_or(InvalidSignature)?;
        let age = now.timestamp() - timestamp;
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        if age < 0 || age > max_age {
            return Err(InvalidSignature);
        }

        Ok(value.to_owned())
    }

    fn signature(&self, payload: &str) -> blake3::Hash {
        blake3::keyed_hash(&self.key, payload.as_bytes())
    }
}

impl Debug for Signer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

/// Big endian bytes with leading zeros stripped.
fn encode_timestamp(timestamp: i64) -> String {
    let bytes = timestamp.max(0).to_be_bytes();
    let first = bytes.iter().position(|byte| *byte != 0).unwrap_or(bytes.len());
    URL_SAFE_NO_PAD.encode(&bytes[first..])
}

fn decode_timestamp(encoded: &str) -> Option<i64> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    if bytes.len() > 8 {
        return None;
    }
    let mut buffer = [0; 8];
    buffer[8 - bytes.len()..].copy_from_slice(&bytes);
    i64::try_from(u64::from_be_bytes(buffer)).ok()
}
