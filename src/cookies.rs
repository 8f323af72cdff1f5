//! The cookie side of the session protocol: reading the session cookie from a request and the
//! `Set-Cookie` instructions produced when a session is persisted.

use crate::SessionConfig;
use cookie::time::Duration;
use cookie::Cookie;

/// The parts of an incoming request the session factory looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHead {
    cookie_header: Option<String>,
    secure: bool,
}

impl RequestHead {
    /// Describe a request made with the given URL scheme, e.g. `"https"`.
    /// Requests over `https` or `wss` are considered to use secure transport.
    pub fn new(scheme: &str) -> Self {
        Self {
            cookie_header: None,
            secure: scheme.eq_ignore_ascii_case("https") || scheme.eq_ignore_ascii_case("wss"),
        }
    }

    /// Set the value of the request's `Cookie` header.
    pub fn with_cookie_header(mut self, cookie_header: impl Into<String>) -> Self {
        self.cookie_header = Some(cookie_header.into());
        self
    }

    /// Returns the value of the request's `Cookie` header, if it has one.
    pub fn cookie_header(&self) -> Option<&str> {
        self.cookie_header.as_deref()
    }

    /// Returns the value of the cookie called `name`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        find_cookie(self.cookie_header()?, name)
    }

    /// Returns true if the request was made over secure transport.
    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

/// Find the value of the cookie called `name` in a `Cookie` header value.
///
/// If the cookie appears more than once, the first occurrence is returned.
/// Pairs that do not parse as cookies are skipped, and surrounding double quotes are removed
/// from the value.
///
/// ```rust
/// # use pvault_session::find_cookie;
/// let header = "theme=dark; session_id=\"abc.def.ghi\"; lang=en";
/// assert_eq!(find_cookie(header, "session_id").as_deref(), Some("abc.def.ghi"));
/// assert_eq!(find_cookie(header, "missing"), None);
/// ```
pub fn find_cookie(cookie_header: &str, name: &str) -> Option<String> {
    Cookie::split_parse(cookie_header)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value_trimmed().to_owned())
}

/// The session cookie carrying `value`, with the attributes from `config`.
pub(crate) fn session_cookie(
    config: &SessionConfig,
    value: String,
    secure: bool,
) -> Cookie<'static> {
    let max_age = i64::try_from(config.max_age.as_secs()).unwrap_or(i64::MAX);
    Cookie::build((config.cookie_name.clone(), value))
        .path(config.cookie_path.clone())
        .max_age(Duration::seconds(max_age))
        .http_only(config.http_only)
        .secure(secure)
        .same_site(config.same_site)
        .build()
}

/// A cookie that makes the client drop the session cookie.
pub(crate) fn removal_cookie(config: &SessionConfig) -> Cookie<'static> {
    let mut cookie = Cookie::build((config.cookie_name.clone(), ""))
        .path(config.cookie_path.clone())
        .build();
    cookie.make_removal();
    cookie
}

/// Indicates how the client's session cookie should be updated.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCookieCommand {
    /// Set the session cookie.
    Set(Cookie<'static>),
    /// Delete the session cookie. The cookie is already in its removal form.
    Delete(Cookie<'static>),
    /// Leave the session cookie as it is.
    DoNothing,
}

impl SessionCookieCommand {
    /// Returns the cookie to send, if any.
    pub fn cookie(&self) -> Option<&Cookie<'static>> {
        match self {
            Self::Set(cookie) | Self::Delete(cookie) => Some(cookie),
            Self::DoNothing => None,
        }
    }

    /// Render this command as the value of a `Set-Cookie` response header.
    /// Returns `None` for [`SessionCookieCommand::DoNothing`].
    pub fn header_value(&self) -> Option<String> {
        self.cookie().map(|cookie| cookie.to_string())
    }
}
