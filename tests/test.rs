use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use cookie::time::Duration as CookieDuration;
use pvault_session::codec::{serialize, SessionData};
use pvault_session::{
    CacheStore, Cookie, Error, MemoryStore, Operation, RequestHead, SameSite, SessionConfig,
    SessionCookieCommand, SessionFactory, SessionValue,
};
use std::time::Duration;

const SECRET: &str = "this-is-a-very-long-secret-key-for-testing";
const TWELVE_HOURS: Duration = Duration::from_secs(12 * 60 * 60);

fn factory() -> SessionFactory<MemoryStore> {
    SessionFactory::new(SessionConfig::new(SECRET), MemoryStore::new_with_logger()).unwrap()
}

fn request_with_cookie(cookie_value: &str) -> RequestHead {
    RequestHead::new("https").with_cookie_header(format!("theme=dark; session_id={cookie_value}"))
}

fn expect_set(command: SessionCookieCommand) -> Cookie<'static> {
    match command {
        SessionCookieCommand::Set(cookie) => cookie,
        other => panic!("expected the session cookie to be set, got {other:?}"),
    }
}

fn operations(factory: &SessionFactory<MemoryStore>) -> Vec<Operation> {
    factory.store().operations().unwrap()
}

/// A new session that is never mutated is neither stored nor sent to the client.
#[async_std::test]
async fn test_dont_store_untouched_session() {
    let factory = factory();
    let request = RequestHead::new("https");
    let session = factory.resolve(&request).await.unwrap();
    assert!(session.is_new());
    assert!(session.is_empty());
    assert_eq!(
        factory.persist(session, &request).await.unwrap(),
        SessionCookieCommand::DoNothing
    );
    assert!(operations(&factory).is_empty());
}

/// A mutated new session is stored in the cache, and a second request presenting its cookie gets the data back.
#[async_std::test]
async fn test_store_and_load_session() {
    let factory = factory();
    let request = RequestHead::new("https");
    let mut session = factory.resolve(&request).await.unwrap();
    session.insert("counter", 1);
    let session_id = session.id().to_owned();
    let cookie = expect_set(factory.persist(session, &request).await.unwrap());

    assert_eq!(cookie.name(), "session_id");
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(43200)));
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    assert_eq!(
        factory.signer().unsign(cookie.value(), TWELVE_HOURS),
        Ok(session_id.clone())
    );
    let header = SessionCookieCommand::Set(cookie.clone())
        .header_value()
        .unwrap();
    assert_eq!(Cookie::parse(header).unwrap(), cookie);

    let key = format!("pvault/session/data/{session_id}");
    let mut expected = SessionData::new();
    expected.insert("counter".to_owned(), 1.into());
    assert_eq!(
        operations(&factory),
        [Operation::SetWithExpiry {
            key: key.clone(),
            value: serialize(&expected).unwrap(),
            ttl: TWELVE_HOURS,
        }]
    );

    let mut session = factory
        .resolve(&request_with_cookie(cookie.value()))
        .await
        .unwrap();
    assert!(!session.is_new());
    assert!(!session.should_persist());
    assert_eq!(session.get("counter"), Some(&SessionValue::Integer(1)));
    assert_eq!(session.id(), session_id);
    assert_eq!(operations(&factory)[1], Operation::Get { key });
}

/// A loaded session that is not mutated is not written back, and the cookie is left alone.
#[async_std::test]
async fn test_dont_update_unchanged_session() {
    let factory = factory();
    let (_, command) = factory
        .handle(&RequestHead::new("http"), |session| {
            session.insert("user", "ferris");
        })
        .await
        .unwrap();
    let cookie = expect_set(command);
    assert_eq!(cookie.secure(), Some(false));

    let request = request_with_cookie(cookie.value());
    let (user, command) = factory
        .handle(&request, |session| {
            session.get("user").and_then(SessionValue::as_str).map(str::to_owned)
        })
        .await
        .unwrap();
    assert_eq!(user.as_deref(), Some("ferris"));
    assert_eq!(command, SessionCookieCommand::DoNothing);
    assert!(matches!(
        operations(&factory).as_slice(),
        [Operation::SetWithExpiry { .. }, Operation::Get { .. }]
    ));
}

/// A cookie signed longer ago than the maximum age is never trusted, so the cache is not consulted.
#[async_std::test]
async fn test_expired_cookie() {
    let factory = factory();
    let request = RequestHead::new("https");
    let mut session = factory.resolve(&request).await.unwrap();
    session.insert("counter", 1);
    let session_id = session.id().to_owned();
    factory.persist(session, &request).await.unwrap();

    let old_cookie = factory
        .signer()
        .sign_at(&session_id, Utc::now() - chrono::Duration::hours(13));
    let session = factory
        .resolve(&request_with_cookie(&old_cookie))
        .await
        .unwrap();
    assert!(session.is_new());
    assert!(session.is_empty());
    assert_eq!(session.current_id(), None);
    assert!(matches!(
        operations(&factory).as_slice(),
        [Operation::SetWithExpiry { .. }]
    ));
}

/// Cookies with a bad signature are treated like no cookie at all.
#[async_std::test]
async fn test_tampered_cookie() {
    let factory = factory();
    let other = SessionFactory::new(
        SessionConfig::new("another-very-long-secret-key-for-testing"),
        MemoryStore::new(),
    )
    .unwrap();
    let forged = other.signer().sign("some-session-id");

    for cookie_value in [forged.as_str(), "garbage", "", "a.b.c"] {
        let session = factory
            .resolve(&request_with_cookie(cookie_value))
            .await
            .unwrap();
        assert!(session.is_new());
    }
    assert!(operations(&factory).is_empty());
}

/// A validly signed cookie for which the cache holds nothing yields a new session.
#[async_std::test]
async fn test_cache_miss() {
    let factory = factory();
    let cookie = factory.signer().sign("unknown-session-id");
    let session = factory
        .resolve(&request_with_cookie(&cookie))
        .await
        .unwrap();
    assert!(session.is_new());
    assert_eq!(
        operations(&factory),
        [Operation::Get {
            key: "pvault/session/data/unknown-session-id".to_owned()
        }]
    );
}

/// Corrupt cached data yields a new session instead of an error.
#[async_std::test]
async fn test_corrupt_payload() {
    let factory = factory();
    let mut trailing = serialize(&SessionData::new()).unwrap();
    trailing.push(0xc0);

    for (session_id, payload) in [
        ("garbage", b"\xc1\xc1\xc1".to_vec()),
        ("truncated", vec![0x81, 0xa1]),
        ("trailing", trailing),
        ("not-a-map", vec![0x93, 0x01, 0x02, 0x03]),
    ] {
        factory
            .store()
            .set_with_expiry(&factory.cache_key(session_id), payload, TWELVE_HOURS)
            .await
            .unwrap();
        let cookie = factory.signer().sign(session_id);
        let session = factory
            .resolve(&request_with_cookie(&cookie))
            .await
            .unwrap();
        assert!(session.is_new(), "{session_id} was not rejected");
        assert!(session.is_empty());
    }
}

/// Invalidating a session without storing new data deletes the old entry and the cookie.
#[async_std::test]
async fn test_invalidate_session() {
    let factory = factory();
    let request = RequestHead::new("https");
    let mut session = factory.resolve(&request).await.unwrap();
    session.insert("user", "ferris");
    let old_id = session.id().to_owned();
    let cookie = expect_set(factory.persist(session, &request).await.unwrap());

    let request = request_with_cookie(cookie.value());
    let (_, command) = factory
        .handle(&request, |session| session.invalidate())
        .await
        .unwrap();
    let SessionCookieCommand::Delete(removal) = command else {
        panic!("expected the session cookie to be deleted, got {command:?}");
    };
    assert_eq!(removal.name(), "session_id");
    assert_eq!(removal.value(), "");
    assert_eq!(removal.path(), Some("/"));
    assert_eq!(removal.max_age(), Some(CookieDuration::ZERO));

    let operations = operations(&factory);
    assert_eq!(operations.len(), 3);
    assert_eq!(
        operations[2],
        Operation::Delete {
            key: format!("pvault/session/data/{old_id}")
        }
    );
    assert_eq!(factory.store().get(&factory.cache_key(&old_id)).await.unwrap(), None);

    let session = factory.resolve(&request).await.unwrap();
    assert!(session.is_new());
}

/// Invalidating a session and then storing data moves the data to a new id.
#[async_std::test]
async fn test_invalidate_and_recreate_session() {
    let factory = factory();
    let request = RequestHead::new("https");
    let mut session = factory.resolve(&request).await.unwrap();
    session.insert("user", "anonymous");
    let old_id = session.id().to_owned();
    let cookie = expect_set(factory.persist(session, &request).await.unwrap());

    let mut session = factory
        .resolve(&request_with_cookie(cookie.value()))
        .await
        .unwrap();
    session.invalidate();
    session.insert("user", "ferris");
    let new_id = session.id().to_owned();
    assert_ne!(new_id, old_id);
    let cookie = expect_set(factory.persist(session, &request).await.unwrap());
    assert_eq!(
        factory.signer().unsign(cookie.value(), TWELVE_HOURS),
        Ok(new_id.clone())
    );

    let operations = operations(&factory);
    assert_eq!(operations.len(), 4);
    assert_eq!(
        operations[2],
        Operation::Delete {
            key: format!("pvault/session/data/{old_id}")
        }
    );
    assert!(matches!(
        &operations[3],
        Operation::SetWithExpiry { key, .. } if *key == format!("pvault/session/data/{new_id}")
    ));

    let session = factory
        .resolve(&request_with_cookie(cookie.value()))
        .await
        .unwrap();
    assert_eq!(session.get("user"), Some(&SessionValue::from("ferris")));
}

/// Flash messages survive until they are popped on a later request.
#[async_std::test]
async fn test_flash_across_requests() {
    let factory = factory();
    let (_, command) = factory
        .handle(&RequestHead::new("https"), |session| {
            session.flash("Counter updated", "success", true);
        })
        .await
        .unwrap();
    let request = request_with_cookie(expect_set(command).value());

    let (messages, command) = factory
        .handle(&request, |session| session.pop_flash("success"))
        .await
        .unwrap();
    assert_eq!(messages, vec![SessionValue::from("Counter updated")]);
    // Popping changed the session, so it is written back and the cookie renewed.
    expect_set(command);

    let (messages, _) = factory
        .handle(&request, |session| session.pop_flash("success"))
        .await
        .unwrap();
    assert!(messages.is_empty());
}

/// An invalid configuration is rejected when creating the factory.
#[test]
fn test_invalid_config() {
    assert!(matches!(
        SessionFactory::new(SessionConfig::new("short"), MemoryStore::new()),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        SessionFactory::new(
            SessionConfig::new(SECRET).with_cookie_name(""),
            MemoryStore::new()
        ),
        Err(Error::InvalidConfig(_))
    ));
}

/// Cookie names that would break the `Set-Cookie` header are rejected up front.
#[test]
fn test_invalid_cookie_name() {
    for name in ["a;b", "session id", "a=b"] {
        assert!(matches!(
            SessionFactory::new(
                SessionConfig::new(SECRET).with_cookie_name(name),
                MemoryStore::new()
            ),
            Err(Error::InvalidConfig(_))
        ));
    }
}

/// A lifetime too long to compute expiry times with is rejected instead of failing on persist.
#[test]
fn test_max_age_out_of_range() {
    let config =
        SessionConfig::new(SECRET).with_max_age(Duration::from_secs(1_000_000 * 365 * 24 * 3600));
    assert!(matches!(
        SessionFactory::new(config, MemoryStore::new()),
        Err(Error::InvalidConfig("max_age is too large"))
    ));
}

/// Custom cookie settings are applied to the cookie and the cache key.
#[async_std::test]
async fn test_custom_config() {
    let config = SessionConfig::new(SECRET)
        .with_cookie_name("sid")
        .with_key_prefix("app/sessions/")
        .with_max_age(Duration::from_secs(60));
    let factory = SessionFactory::new(config, MemoryStore::new_with_logger()).unwrap();
    let request = RequestHead::new("https");
    let (session_id, command) = factory
        .handle(&request, |session| {
            session.insert("a", true);
            session.id().to_owned()
        })
        .await
        .unwrap();
    let cookie = expect_set(command);
    assert_eq!(cookie.name(), "sid");
    assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(60)));
    assert_eq!(
        operations(&factory),
        [Operation::SetWithExpiry {
            key: format!("app/sessions/{session_id}"),
            value: serialize(&SessionData::from([("a".to_owned(), true.into())])).unwrap(),
            ttl: Duration::from_secs(60),
        }]
    );

    let request = RequestHead::new("https").with_cookie_header(format!("sid={}", cookie.value()));
    let session = factory.resolve(&request).await.unwrap();
    assert!(!session.is_new());
}

#[derive(Debug)]
struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Err(anyhow!("connection refused"))
    }

    async fn set_with_expiry(
        &self,
        _key: &str,
        _value: Vec<u8>,
        _ttl: Duration,
    ) -> anyhow::Result<()> {
        Err(anyhow!("connection refused"))
    }

    async fn delete(&self, _key: &str) -> anyhow::Result<()> {
        Err(anyhow!("connection refused"))
    }
}

/// Cache failures are not hidden, as that would silently lose session writes.
#[async_std::test]
async fn test_cache_unavailable() {
    let factory = SessionFactory::new(SessionConfig::new(SECRET), UnreachableStore).unwrap();

    // Without a cookie the cache is not needed to resolve.
    let request = RequestHead::new("https");
    let mut session = factory.resolve(&request).await.unwrap();
    session.insert("a", 1);
    assert!(matches!(
        factory.persist(session, &request).await,
        Err(Error::CacheUnavailable(_))
    ));

    let cookie = factory.signer().sign("some-session-id");
    assert!(matches!(
        factory.resolve(&request_with_cookie(&cookie)).await,
        Err(Error::CacheUnavailable(_))
    ));

    // Unchanged sessions never touch the cache.
    assert_eq!(
        factory
            .persist(pvault_session::Session::new(), &request)
            .await
            .unwrap(),
        SessionCookieCommand::DoNothing
    );
}
