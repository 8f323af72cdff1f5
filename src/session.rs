use crate::codec::SessionData;
use crate::SessionValue;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::{btree_map, BTreeSet};

const FLASH_KEY: &str = "_flash_messages";
const FLASH_QUEUE_SEPARATOR: char = '.';
const CSRF_TOKEN_KEY: &str = "_csrf_token";

/// Number of random bytes in session ids and csrf tokens.
pub(crate) const TOKEN_BYTES: usize = 32;

/// Generate a random token from the operating system's cryptographically secure generator.
pub(crate) fn generate_token() -> String {
    let mut bytes = [0; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A session with a client.
///
/// The session holds a map from string keys to [`SessionValue`]s.
/// Every method that can modify the map marks the session as changed, even if the map ends up
/// unmodified, and there is no way to mutate the map without going through these methods.
/// A changed session is written back to the cache when it is passed to
/// [`SessionFactory::persist`](crate::SessionFactory::persist).
///
/// It is marked `#[must_use]`, as dropping it will not update the cache.
///
/// # Example
///
/// ```rust
/// # use pvault_session::{Session, SessionValue};
/// let mut session = Session::new();
/// assert!(session.is_new());
/// assert!(!session.should_persist());
///
/// session.insert("counter", 1);
/// assert_eq!(session.get("counter"), Some(&SessionValue::Integer(1)));
/// assert!(session.should_persist());
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct Session {
    data: SessionData,
    id: Option<String>,
    new: bool,
    created: i64,
    changed: bool,
    invalidated: BTreeSet<String>,
}

impl Session {
    /// Create a new empty session without an id.
    pub fn new() -> Self {
        Self {
            data: SessionData::new(),
            id: None,
            new: true,
            created: Utc::now().timestamp(),
            changed: false,
            invalidated: BTreeSet::new(),
        }
    }

    /// **This method should only be called by a session factory!**
    ///
    /// Create a session from data loaded from the cache under the given id.
    /// The session is neither new nor changed.
    pub fn new_from_cache(id: String, data: SessionData) -> Self {
        Self {
            data,
            id: Some(id),
            new: false,
            ..Self::new()
        }
    }

    /// Returns the id of this session, generating one if it has none yet.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use pvault_session::Session;
    /// let mut session = Session::new();
    /// assert_eq!(session.current_id(), None);
    /// let id = session.id().to_owned();
    /// assert_eq!(session.id(), id);
    /// assert_eq!(session.current_id(), Some(id.as_str()));
    /// ```
    pub fn id(&mut self) -> &str {
        self.id.get_or_insert_with(generate_token)
    }

    /// Returns the id of this session, if one was assigned.
    pub fn current_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns true if this session was not loaded from the cache.
    pub fn is_new(&self) -> bool {
        self.new
    }

    /// Returns the creation time of this session object, in seconds since the unix epoch.
    pub fn created(&self) -> i64 {
        self.created
    }

    /// Returns true if the session data must be written back to the cache.
    pub fn should_persist(&self) -> bool {
        self.changed
    }

    /// Mark the session as changed, forcing it to be written back to the cache.
    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// The ids this session had before it was invalidated.
    /// Their cache entries are deleted when the session is persisted.
    pub fn invalidated(&self) -> &BTreeSet<String> {
        &self.invalidated
    }

    /// Discard all data and detach the session from its id.
    ///
    /// The session becomes new and unchanged, and gets a fresh id when one is next requested.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use pvault_session::Session;
    /// let mut session = Session::new();
    /// session.insert("user", "ferris");
    /// let old_id = session.id().to_owned();
    ///
    /// session.invalidate();
    /// assert!(session.is_empty());
    /// assert!(session.is_new());
    /// assert!(!session.should_persist());
    /// assert!(session.invalidated().contains(&old_id));
    /// assert_ne!(session.id(), old_id);
    /// ```
    pub fn invalidate(&mut self) {
        self.data.clear();
        self.new = true;
        self.created = Utc::now().timestamp();
        self.changed = false;

        if let Some(id) = self.id.take() {
            self.invalidated.insert(id);
        }
    }

    /// Returns a reference to the session data.
    /// This does not mark the session as changed.
    pub fn data(&self) -> &SessionData {
        &self.data
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&SessionValue> {
        self.data.get(key)
    }

    /// Returns true if a value is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if no values are stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterates over the stored keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, String, SessionValue> {
        self.data.keys()
    }

    /// Iterates over the stored entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, SessionValue> {
        self.data.iter()
    }

    /// Returns a mutable reference to the value stored under `key`, and marks the session as changed.
    ///
    /// Note that the session gets marked as changed, even if the returned reference is never written to.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut SessionValue> {
        self.changed = true;
        self.data.get_mut(key)
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<SessionValue>,
    ) -> Option<SessionValue> {
        self.changed = true;
        self.data.insert(key.into(), value.into())
    }

    /// Remove and return the value stored under `key`.
    /// The session is marked as changed even if there was no such value.
    pub fn remove(&mut self, key: &str) -> Option<SessionValue> {
        self.changed = true;
        self.data.remove(key)
    }

    /// Remove the value stored under `key`, returning it or `default` if there was none.
    pub fn pop(&mut self, key: &str, default: impl Into<SessionValue>) -> SessionValue {
        self.remove(key).unwrap_or_else(|| default.into())
    }

    /// Remove and return the entry with the greatest key.
    pub fn pop_item(&mut self) -> Option<(String, SessionValue)> {
        self.changed = true;
        self.data.pop_last()
    }

    /// Remove all values.
    pub fn clear(&mut self) {
        self.changed = true;
        self.data.clear();
    }

    /// Returns the value stored under `key`, storing `default` first if there is none.
    pub fn set_default(
        &mut self,
        key: impl Into<String>,
        default: impl Into<SessionValue>,
    ) -> &mut SessionValue {
        self.changed = true;
        self.data.entry(key.into()).or_insert_with(|| default.into())
    }

    /// Store all given entries, replacing existing values.
    pub fn update<K, V>(&mut self, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<SessionValue>,
    {
        self.changed = true;
        self.data.extend(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );
    }

    /// Append `message` to the flash queue `queue`. The empty string names the default queue.
    ///
    /// If `allow_duplicate` is false and the queue already contains an equal message, nothing is appended
    /// and the session is not marked as changed.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use pvault_session::{Session, SessionValue};
    /// let mut session = Session::new();
    /// session.flash("Counter updated", "success", false);
    /// session.flash("Counter updated", "success", false);
    /// assert_eq!(session.peek_flash("success"), [SessionValue::from("Counter updated")]);
    /// assert_eq!(session.pop_flash("success"), vec![SessionValue::from("Counter updated")]);
    /// assert!(session.peek_flash("success").is_empty());
    /// ```
    pub fn flash(&mut self, message: impl Into<SessionValue>, queue: &str, allow_duplicate: bool) {
        let message = message.into();
        let key = flash_queue_key(queue);
        let duplicate = self
            .get(&key)
            .and_then(SessionValue::as_list)
            .is_some_and(|messages| messages.contains(&message));
        if duplicate && !allow_duplicate {
            return;
        }
        match self.set_default(key, SessionValue::List(Vec::new())) {
            SessionValue::List(messages) => messages.push(message),
            other => *other = SessionValue::List(vec![message]),
        }
    }

    /// Remove and return all messages of the flash queue `queue`.
    ///
    /// A value under the queue's key that is not a list is removed as well, and an empty list is returned.
    pub fn pop_flash(&mut self, queue: &str) -> Vec<SessionValue> {
        match self.remove(&flash_queue_key(queue)) {
            Some(SessionValue::List(messages)) => messages,
            _ => Vec::new(),
        }
    }

    /// Returns the messages of the flash queue `queue` without removing them.
    pub fn peek_flash(&self, queue: &str) -> &[SessionValue] {
        self.get(&flash_queue_key(queue))
            .and_then(SessionValue::as_list)
            .unwrap_or_default()
    }

    /// Generate and store a new csrf token, replacing the previous one.
    pub fn new_csrf_token(&mut self) -> String {
        let token = generate_token();
        self.insert(CSRF_TOKEN_KEY, token.clone());
        token
    }

    /// Returns the stored csrf token, generating one if there is none.
    pub fn csrf_token(&mut self) -> String {
        match self.get(CSRF_TOKEN_KEY).and_then(SessionValue::as_str) {
            Some(token) => token.to_owned(),
            None => self.new_csrf_token(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn flash_queue_key(queue: &str) -> String {
    if queue.is_empty() {
        FLASH_KEY.to_owned()
    } else {
        format!("{FLASH_KEY}{FLASH_QUEUE_SEPARATOR}{queue}")
    }
}
