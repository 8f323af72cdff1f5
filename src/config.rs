use chrono::Utc;
use cookie::SameSite;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

/// Separators that RFC 6265 forbids in a cookie name, besides whitespace and control characters.
const COOKIE_NAME_SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={}";

/// Configuration of a [`SessionFactory`](crate::SessionFactory).
///
/// # Example
///
/// ```rust
/// # use pvault_session::SessionConfig;
/// # use std::time::Duration;
/// let config = SessionConfig::new("a-very-long-secret-of-at-least-32-bytes")
///     .with_cookie_name("sid")
///     .with_max_age(Duration::from_secs(60 * 60));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.cookie_name, "sid");
/// assert_eq!(config.key_prefix, "pvault/session/data/");
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    /// The secret used to sign session cookies.
    pub secret: Vec<u8>,
    /// Separates the session signing key from other keys derived from the same secret.
    pub salt: String,
    /// The name of the session cookie.
    pub cookie_name: String,
    /// The `Path` attribute of the session cookie.
    pub cookie_path: String,
    /// The `HttpOnly` attribute of the session cookie.
    pub http_only: bool,
    /// The `SameSite` attribute of the session cookie.
    pub same_site: SameSite,
    /// Lifetime of a session: the cookie `Max-Age`, the cache entry expiry, and the maximum age of a signature.
    pub max_age: Duration,
    /// Prepended to a session id to obtain its cache key.
    pub key_prefix: String,
}

impl SessionConfig {
    /// The minimum length of the secret, in bytes.
    pub const MINIMUM_SECRET_LENGTH: usize = 32;

    /// Create a configuration with the given secret and default settings.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    /// Set the salt of the cookie signer.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    /// Set the name of the session cookie.
    pub fn with_cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.cookie_name = cookie_name.into();
        self
    }

    /// Set the `Path` attribute of the session cookie.
    pub fn with_cookie_path(mut self, cookie_path: impl Into<String>) -> Self {
        self.cookie_path = cookie_path.into();
        self
    }

    /// Set the `HttpOnly` attribute of the session cookie.
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Set the `SameSite` attribute of the session cookie.
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Set the lifetime of sessions.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the prefix of cache keys.
    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Check that this configuration can be used.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.secret.is_empty() {
            return Err("secret must not be empty");
        }
        if self.secret.len() < Self::MINIMUM_SECRET_LENGTH {
            return Err("secret should be at least 32 bytes");
        }
        if self.cookie_name.is_empty() {
            return Err("cookie_name must not be empty");
        }
        if !self
            .cookie_name
            .bytes()
            .all(|byte| byte.is_ascii_graphic() && !COOKIE_NAME_SEPARATORS.contains(&byte))
        {
            return Err("cookie_name must be a cookie token");
        }
        if self.max_age.as_secs() == 0 {
            return Err("max_age must be at least one second");
        }
        // Expiry times are computed as now + max_age and must stay representable.
        let in_range = chrono::Duration::from_std(self.max_age)
            .ok()
            .and_then(|max_age| Utc::now().checked_add_signed(max_age))
            .is_some();
        if !in_range {
            return Err("max_age is too large");
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: Vec::new(),
            salt: "session".to_owned(),
            cookie_name: "session_id".to_owned(),
            cookie_path: "/".to_owned(),
            http_only: true,
            same_site: SameSite::Lax,
            max_age: Duration::from_secs(12 * 60 * 60),
            key_prefix: "pvault/session/data/".to_owned(),
        }
    }
}

impl Debug for SessionConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"[REDACTED]")
            .field("salt", &self.salt)
            .field("cookie_name", &self.cookie_name)
            .field("cookie_path", &self.cookie_path)
            .field("http_only", &self.http_only)
            .field("same_site", &self.same_site)
            .field("max_age", &self.max_age)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}
