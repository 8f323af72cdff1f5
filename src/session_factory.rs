use crate::codec::{serialize, try_deserialize};
use crate::cookies::{removal_cookie, session_cookie};
use crate::{
    CacheStore, Error, RequestHead, Result, Session, SessionConfig, SessionCookieCommand, Signer,
};
use chrono::{DateTime, Utc};

/// Resolves requests to sessions and persists sessions when responding.
///
/// This is the user-facing interface of the session subsystem.
/// Each request goes through two phases, which the host pipeline must drive:
///
/// 1. [`resolve`](Self::resolve) when the request arrives, producing the [`Session`] handed to request processing.
/// 2. [`persist`](Self::persist) exactly once before the response is sent, producing the cookie update for the response.
///
/// If request processing aborts before the response, `persist` is not called and nothing is written.
/// [`handle`](Self::handle) runs both phases around a synchronous handler.
///
/// Broken, expired or unknown session cookies never produce an error: the request simply gets a new, empty session.
/// Only failures of the cache store itself are reported, as [`Error::CacheUnavailable`].
#[derive(Debug)]
pub struct SessionFactory<Store> {
    store: Store,
    signer: Signer,
    config: SessionConfig,
}

impl<Store: CacheStore> SessionFactory<Store> {
    /// Create a new session factory with the given configuration and cache store.
    pub fn new(config: SessionConfig, store: Store) -> Result<Self> {
        config.validate().map_err(Error::InvalidConfig)?;
        Ok(Self {
            store,
            signer: Signer::new(&config.secret, &config.salt),
            config,
        })
    }

    /// Returns the configuration of this factory.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the signer used for session cookies.
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Returns the cache store of this factory.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Consumes the factory, returning its cache store.
    pub fn into_inner(self) -> Store {
        self.store
    }

    /// Returns the cache key of the session with the given id.
    pub fn cache_key(&self, session_id: &str) -> String {
        format!("{}{session_id}", self.config.key_prefix)
    }

    /// Get the session of a request.
    ///
    /// Returns a new empty session if the request has no session cookie, if the cookie is not
    /// validly signed or has expired, if the cache holds no data for it, or if that data is corrupt.
    pub async fn resolve(&self, request: &RequestHead) -> Result<Session> {
        self.resolve_at(request, Utc::now()).await
    }

    /// Like [`resolve`](Self::resolve), but verifies the cookie signature against the given time.
    pub async fn resolve_at(&self, request: &RequestHead, now: DateTime<Utc>) -> Result<Session> {
        let Some(cookie_value) = request.cookie(&self.config.cookie_name) else {
            return Ok(Session::new());
        };

        let Ok(session_id) = self
            .signer
            .unsign_at(&cookie_value, self.config.max_age, now)
        else {
            log::debug!("Ignoring session cookie with an invalid or expired signature");
            return Ok(Session::new());
        };

        let key = self.cache_key(&session_id);
        let Some(bytes) = self
            .store
            .get(&key)
            .await
            .map_err(Error::CacheUnavailable)?
        else {
            log::debug!("No cached data for session cookie, starting a new session");
            return Ok(Session::new());
        };

        match try_deserialize(&bytes) {
            Ok(data) => Ok(Session::new_from_cache(session_id, data)),
            Err(error) => {
                log::debug!("Discarding corrupt session data under {key}: {error}");
                Ok(Session::new())
            }
        }
    }

    /// Write back a session at the end of a request.
    ///
    /// Deletes the cache entries of all ids the session was invalidated from.
    /// If the session changed, its data is stored under its current id and a cookie carrying the
    /// signed id is returned. If it was only invalidated, the returned command deletes the cookie.
    /// Otherwise nothing is written and [`SessionCookieCommand::DoNothing`] is returned.
    ///
    /// `request` is the request the session was resolved from.
    pub async fn persist(
        &self,
        session: Session,
        request: &RequestHead,
    ) -> Result<SessionCookieCommand> {
        self.persist_at(session, request, Utc::now()).await
    }

    /// Like [`persist`](Self::persist), but signs the cookie with the given time.
    pub async fn persist_at(
        &self,
        mut session: Session,
        request: &RequestHead,
        now: DateTime<Utc>,
    ) -> Result<SessionCookieCommand> {
        let mut command = SessionCookieCommand::DoNothing;

        if !session.invalidated().is_empty() {
            for session_id in session.invalidated() {
                self.store
                    .delete(&self.cache_key(session_id))
                    .await
                    .map_err(Error::CacheUnavailable)?;
            }

            if !session.should_persist() {
                command = SessionCookieCommand::Delete(removal_cookie(&self.config));
            }
        }

        if session.should_persist() {
            let bytes = serialize(session.data())?;
            let session_id = session.id().to_owned();
            self.store
                .set_with_expiry(&self.cache_key(&session_id), bytes, self.config.max_age)
                .await
                .map_err(Error::CacheUnavailable)?;

            command = SessionCookieCommand::Set(session_cookie(
                &self.config,
                self.signer.sign_at(&session_id, now),
                request.is_secure(),
            ));
        }

        Ok(command)
    }

    /// Resolve the session of `request`, run `handler` on it and persist it.
    ///
    /// Returns the output of the handler and the cookie update for the response.
    pub async fn handle<Output>(
        &self,
        request: &RequestHead,
        handler: impl FnOnce(&mut Session) -> Output,
    ) -> Result<(Output, SessionCookieCommand)> {
        let mut session = self.resolve(request).await?;
        let output = handler(&mut session);
        let command = self.persist(session, request).await?;
        Ok((output, command))
    }
}
