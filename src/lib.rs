//! Signed-cookie, cache-backed HTTP sessions.
//!
//! A session is a map from string keys to [`SessionValue`]s that lives for the duration of one
//! request. Its data is stored in an external key/value cache (see [`CacheStore`]) under a
//! random session id, and the client carries that id in a signed, timestamped cookie.
//!
//! # Change tracking
//!
//! Every method of [`Session`] that can modify its data marks the session as changed.
//! The [`SessionFactory`] only writes a session back to the cache, and only sends a cookie,
//! if the session was changed during the request.
//! [`Session::invalidate`] drops the data and detaches the session from its id; the cache entry
//! of the old id is deleted when the session is persisted.
//!
//! # Flash messages
//!
//! Flash messages are queued in the session with [`Session::flash`] and consumed on a later
//! request with [`Session::pop_flash`]. They are ordinary session data.
//!
//! # Security
//!
//! Session ids are 32 bytes from the operating system's random generator.
//! Cookies are signed with a key derived from the configured secret, and are rejected once they
//! are older than the configured maximum age. A rejected cookie yields a new empty session,
//! without telling the caller why it was rejected.
//!
//! # Example
//!
//! ```
//! use pvault_session::{MemoryStore, RequestHead, SessionConfig, SessionCookieCommand, SessionFactory};
//!
//! # fn main() -> pvault_session::Result {
//! # async_std::task::block_on(async {
//! let config = SessionConfig::new("a-very-long-secret-of-at-least-32-bytes");
//! let factory = SessionFactory::new(config, MemoryStore::new())?;
//!
//! // First request: no cookie, so the session is new.
//! let request = RequestHead::new("https");
//! let mut session = factory.resolve(&request).await?;
//! assert!(session.is_new());
//! session.insert("counter", 1);
//! session.flash("Counter updated", "success", true);
//! let SessionCookieCommand::Set(cookie) = factory.persist(session, &request).await? else {
//!     unreachable!("changed sessions always set the cookie")
//! };
//!
//! // Second request: the cookie identifies the stored session.
//! let request = RequestHead::new("https").with_cookie_header(format!("session_id={}", cookie.value()));
//! let mut session = factory.resolve(&request).await?;
//! assert!(!session.is_new());
//! assert_eq!(session.get("counter").and_then(|value| value.as_i64()), Some(1));
//! assert_eq!(session.pop_flash("success").len(), 1);
//! #
//! # Ok(()) }) }
//! ```

#![forbid(unsafe_code)]
#![deny(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    missing_docs,
    unreachable_pub,
    missing_copy_implementations,
    unused_qualifications
)]

/// A result with the crate's [`Error`], and a default return type of ()
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

mod cache_store;
pub mod codec;
mod config;
mod cookies;
mod error;
mod memory_store;
mod session;
mod session_factory;
mod signer;
mod value;

pub use cache_store::CacheStore;
pub use config::SessionConfig;
pub use cookie::{Cookie, SameSite};
pub use cookies::{find_cookie, RequestHead, SessionCookieCommand};
pub use error::{DeserializationFailure, Error, InvalidSignature};
pub use memory_store::{MemoryStore, Operation};
pub use session::Session;
pub use session_factory::SessionFactory;
pub use signer::Signer;
pub use value::SessionValue;
