//! Authentication result cache.
//!
//! Entries are reference counted: a lookup acquires the entry together with
//! the map lookup, and an entry that is evicted while in use is only torn
//! down when its last user releases it.

pub mod entry;
pub mod policy;

use std::fmt;

use crate::error::Result;
use crate::identity::{credentials_match, CopyMode, Credential, Principal, Subject};
use crate::types::*;

pub use entry::{DomainInfo, EntryState, Lifetime, LoginSession, NoSession};
pub use policy::{CachePolicy, SweeperHandle, TimedCachePolicy};

/// Cache key: the principal's name, or `None` for anonymous callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Option<String>);

impl CacheKey {
    pub fn of(principal: Option<&Principal>) -> Self {
        CacheKey(principal.map(|p| p.name().to_string()))
    }

    pub fn named(name: impl Into<String>) -> Self {
        CacheKey(Some(name.into()))
    }

    pub fn anonymous() -> Self {
        CacheKey(None)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => f.write_str(name),
            None => f.write_str("<anonymous>"),
        }
    }
}

/// Result of consulting the cache before authenticating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// A live entry whose credential matches.
    Hit,
    /// A live entry exists but was validated by a different credential.
    Mismatch,
    Miss,
}

/// The lookup and store halves of credential validation over a [`CachePolicy`].
pub struct AuthenticationCache {
    policy: Arc<dyn CachePolicy>,
    copy_mode: CopyMode,
}

impl AuthenticationCache {
    pub fn new(policy: Arc<dyn CachePolicy>, copy_mode: CopyMode) -> Self {
        Self { policy, copy_mode }
    }

    pub fn policy(&self) -> &Arc<dyn CachePolicy> {
        &self.policy
    }

    pub fn copy_mode(&self) -> CopyMode {
        self.copy_mode
    }

    /// Check `credential` against the entry cached under `key`, copying the
    /// cached subject into `out` on a hit.
    pub fn check(
        &self,
        key: &CacheKey,
        credential: Option<&Credential>,
        out: Option<&mut Subject>,
    ) -> CacheLookup {
        let Some(entry) = self.policy.get(key) else {
            tracing::debug!(%key, "cache miss");
            return CacheLookup::Miss;
        };
        let outcome = if credentials_match(entry.credential(), credential) {
            if let Some(out) = out {
                entry.subject().copy_into(out, self.copy_mode);
            }
            tracing::debug!(%key, "cache hit");
            CacheLookup::Hit
        } else {
            tracing::debug!(%key, "cached credential does not match");
            CacheLookup::Mismatch
        };
        entry.release();
        outcome
    }

    /// Cache a fresh authentication result, replacing any entry under `key`.
    ///
    /// With caching disabled nothing is stored and the login is torn down
    /// right away; `Ok(None)` is returned.
    pub fn store(
        &self,
        key: CacheKey,
        subject: Subject,
        session: Box<dyn LoginSession>,
        credential: Option<&Credential>,
        caller_principal: Option<Principal>,
    ) -> Result<Option<Arc<DomainInfo>>> {
        let lifetime = self.policy.default_lifetime();
        if !lifetime.is_cacheable() {
            tracing::debug!(%key, "caching disabled; not storing authentication result");
            if let Err(e) = session.logout() {
                tracing::warn!(%key, error = %e, "logout of uncached login failed");
            }
            return Ok(None);
        }
        let entry = Arc::new(DomainInfo::new(
            key.clone(),
            subject,
            credential.map(|c| c.copy(true)),
            caller_principal,
            session,
            lifetime,
            Instant::now(),
        )?);
        self.policy.insert(key, Arc::clone(&entry));
        Ok(Some(entry))
    }

    /// Drop the entry for `key`. Returns whether one was cached.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.policy.remove(key).is_some()
    }

    pub fn flush(&self) {
        self.policy.flush();
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.policy.keys()
    }
}
