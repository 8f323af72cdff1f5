use crate::CacheStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// # in-memory cache store
/// Because there is no external
/// persistence, this cache store is ephemeral and will be cleared
/// on server restart.
///
/// # ***READ THIS BEFORE USING IN A PRODUCTION DEPLOYMENT***
///
/// Storing sessions only in memory brings the following problems:
///
/// 1. All sessions must fit in available memory (important for high load services)
/// 2. Expired entries are dropped only when they are read or when [MemoryStore::cleanup] is called.
///    If entries are not cleaned up periodically it might result in OOM
/// 3. All sessions will be lost on shutdown
/// 4. If the service is clustered particular session will be stored only on a single instance.
///    This might be solved by using load balancers with sticky sessions.
///
/// A memory store created with [MemoryStore::new_with_logger] additionally records every operation
/// it receives, which is useful to check the behaviour of a session factory in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    logger: Option<Mutex<Vec<Operation>>>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expiry: DateTime<Utc>,
}

/// An operation received by a [`MemoryStore`] with logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// [`CacheStore::get`] was called.
    Get {
        /// The requested key.
        key: String,
    },
    /// [`CacheStore::set_with_expiry`] was called.
    SetWithExpiry {
        /// The written key.
        key: String,
        /// The written value.
        value: Vec<u8>,
        /// The requested time to live.
        ttl: Duration,
    },
    /// [`CacheStore::delete`] was called.
    Delete {
        /// The deleted key.
        key: String,
    },
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.log(|| Operation::Get {
            key: key.to_owned(),
        })?;
        let now = Utc::now();
        let mut entries = self.entries()?;
        match entries.get(key) {
            Some(entry) if entry.expiry > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                log::trace!("Dropping expired entry {key}");
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.log(|| Operation::SetWithExpiry {
            key: key.to_owned(),
            value: value.clone(),
            ttl,
        })?;
        let expiry = Utc::now()
            .checked_add_signed(chrono::Duration::from_std(ttl)?)
            .ok_or_else(|| anyhow!("ttl of {ttl:?} overflows the expiry time of {key}"))?;
        self.entries()?
            .insert(key.to_owned(), Entry { value, expiry });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.log(|| Operation::Delete {
            key: key.to_owned(),
        })?;
        self.entries()?.remove(key);
        Ok(())
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create a new empty memory store that records all operations it receives.
    pub fn new_with_logger() -> Self {
        Self {
            entries: Default::default(),
            logger: Some(Default::default()),
        }
    }

    /// Returns the operations received so far, oldest first.
    /// Returns an empty list if this store was created without logger.
    pub fn operations(&self) -> Result<Vec<Operation>> {
        match &self.logger {
            Some(logger) => Ok(logger
                .lock()
                .map_err(|_| anyhow!("memory store logger lock poisoned"))?
                .clone()),
            None => Ok(Vec::new()),
        }
    }

    /// Returns the number of entries in the memory store, including expired ones not yet cleaned up.
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    /// Returns true if the memory store is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries()?.is_empty())
    }

    /// Performs cleanup of expired entries. This should be run on an
    /// intermittent basis if this store is run for long enough that
    /// memory accumulation is a concern.
    pub async fn cleanup(&self) -> Result<()> {
        log::trace!("Cleaning up memory store...");
        let now = Utc::now();
        let mut entries = self.entries()?;
        let initial_len = entries.len();
        entries.retain(|_, entry| entry.expiry > now);
        log::trace!("Deleted {} expired entries", initial_len - entries.len());
        Ok(())
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn log(&self, operation: impl FnOnce() -> Operation) -> Result<()> {
        if let Some(logger) = &self.logger {
            let operation = operation();
            log::trace!("{operation:?}");
            logger
                .lock()
                .map_err(|_| anyhow!("memory store logger lock poisoned"))?
                .push(operation);
        }
        Ok(())
    }
}
