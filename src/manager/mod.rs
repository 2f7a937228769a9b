//! Credential validation: the authentication cache in front of an
//! [`Authenticator`], with a choice of locking discipline around the
//! authenticator call.

pub mod authenticator;
pub mod name_locks;
pub mod static_users;

use std::fmt;

use crate::association::AssociationStore;
use crate::cache::{AuthenticationCache, CacheKey, CacheLookup, CachePolicy};
use crate::error::{AuthFailure, CallerIdError, Result};
use crate::identity::{derive_caller_principal, CopyMode, Credential, Principal, Subject};
use crate::types::*;

pub use authenticator::{Authenticated, Authenticator};
pub use name_locks::{NameLockGuard, NameLocks};
pub use static_users::{AnonymousIdentity, StaticAuthenticator, UserEntry, UsersFile};

/// How concurrent first-time logins for one principal are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockingStrategy {
    /// Call the authenticator with no extra locking. Two racing callers may
    /// both authenticate; the later insert replaces the earlier entry.
    Simple,
    /// At most one authenticator call in flight per principal name.
    /// Anonymous callers are never serialized.
    #[default]
    Serialized,
}

impl fmt::Display for LockingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockingStrategy::Simple => f.write_str("simple"),
            LockingStrategy::Serialized => f.write_str("serialized"),
        }
    }
}

/// Validates principals for one security domain.
pub struct AuthenticationManager {
    domain: String,
    cache: AuthenticationCache,
    authenticator: Arc<dyn Authenticator>,
    associations: Arc<AssociationStore>,
    locking: LockingStrategy,
    name_locks: NameLocks,
}

impl fmt::Debug for AuthenticationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationManager")
            .field("domain", &self.domain)
            .field("locking", &self.locking)
            .field("cached", &self.cache.policy().len())
            .finish()
    }
}

impl AuthenticationManager {
    pub fn new(
        domain: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
        policy: Arc<dyn CachePolicy>,
        associations: Arc<AssociationStore>,
    ) -> Self {
        Self {
            domain: domain.into(),
            cache: AuthenticationCache::new(policy, CopyMode::default()),
            authenticator,
            associations,
            locking: LockingStrategy::default(),
            name_locks: NameLocks::new(),
        }
    }

    pub fn with_locking(mut self, locking: LockingStrategy) -> Self {
        self.locking = locking;
        self
    }

    pub fn with_copy_mode(mut self, mode: CopyMode) -> Self {
        self.cache = AuthenticationCache::new(Arc::clone(self.cache.policy()), mode);
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn locking(&self) -> LockingStrategy {
        self.locking
    }

    pub fn cache(&self) -> &AuthenticationCache {
        &self.cache
    }

    pub fn associations(&self) -> &Arc<AssociationStore> {
        &self.associations
    }

    /// Whether `credential` proves `principal`. A `None` principal is an
    /// anonymous attempt.
    ///
    /// On failure the reason is left in the calling context's failure side
    /// channel, see [`last_failure`](Self::last_failure).
    pub fn is_valid(&self, principal: Option<&Principal>, credential: Option<&Credential>) -> bool {
        self.validate(principal, credential, None)
    }

    /// Like [`is_valid`](Self::is_valid), copying the authenticated subject's
    /// principals and credentials into `subject` on success.
    pub fn is_valid_into(
        &self,
        principal: Option<&Principal>,
        credential: Option<&Credential>,
        subject: &mut Subject,
    ) -> bool {
        self.validate(principal, credential, Some(subject))
    }

    /// Validate and return the authenticated subject, or the failure as an error.
    pub fn authenticate(
        &self,
        principal: Option<&Principal>,
        credential: Option<&Credential>,
    ) -> Result<Subject> {
        let mut subject = Subject::new();
        if self.validate(principal, credential, Some(&mut subject)) {
            return Ok(subject);
        }
        let reason = self
            .associations
            .last_auth_failure()
            .map(|f| f.reason)
            .unwrap_or_else(|| "authentication failed".to_string());
        Err(CallerIdError::AuthenticationFailed(reason))
    }

    /// The reason the last attempt in the calling context failed.
    pub fn last_failure(&self) -> Option<AuthFailure> {
        self.associations.last_auth_failure()
    }

    pub fn flush_cache(&self) {
        tracing::info!(domain = %self.domain, "flushing cached authentications");
        self.cache.flush();
    }

    /// Drop the cached result for one principal. Returns whether one existed.
    pub fn flush_principal(&self, principal: Option<&Principal>) -> bool {
        self.cache.invalidate(&CacheKey::of(principal))
    }

    pub fn cached_principals(&self) -> Vec<CacheKey> {
        self.cache.keys()
    }

    fn validate(
        &self,
        principal: Option<&Principal>,
        credential: Option<&Credential>,
        mut out: Option<&mut Subject>,
    ) -> bool {
        self.associations.clear_auth_failure();

        let _name_lock = match (self.locking, principal) {
            (LockingStrategy::Serialized, Some(p)) => Some(self.name_locks.lock(p.name())),
            _ => None,
        };

        let key = CacheKey::of(principal);
        match self.cache.check(&key, credential, out.as_deref_mut()) {
            CacheLookup::Hit => return true,
            CacheLookup::Mismatch | CacheLookup::Miss => {}
        }

        let authenticated = match self.authenticator.authenticate(principal, credential) {
            Ok(authenticated) => authenticated,
            Err(e) => {
                let reason = match e {
                    CallerIdError::AuthenticationFailed(reason) => reason,
                    other => other.to_string(),
                };
                tracing::debug!(domain = %self.domain, %key, %reason, "authentication failed");
                self.associations
                    .record_auth_failure(AuthFailure::new(key.name(), reason));
                return false;
            }
        };

        let Authenticated { subject, session } = authenticated;
        let caller = derive_caller_principal(&subject, principal);
        if let Some(out) = out {
            subject.copy_into(out, self.cache.copy_mode());
        }
        if let Err(e) = self.cache.store(key.clone(), subject, session, credential, caller) {
            // The authentication itself succeeded; only caching it did not.
            tracing::warn!(domain = %self.domain, %key, error = %e, "could not cache authentication");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::AssociationMode;
    use crate::cache::{Lifetime, TimedCachePolicy};

    fn manager(lifetime: Lifetime) -> (AuthenticationManager, Arc<StaticAuthenticator>) {
        let auth = Arc::new(StaticAuthenticator::new().with_user("jduke", "theduke", ["Echo"]));
        let manager = AuthenticationManager::new(
            "other",
            Arc::clone(&auth) as Arc<dyn Authenticator>,
            Arc::new(TimedCachePolicy::new(lifetime)),
            Arc::new(AssociationStore::new(AssociationMode::Isolated)),
        );
        (manager, auth)
    }

    #[test]
    fn mismatch_reauthenticates_and_replaces() {
        let (manager, auth) = manager(Lifetime::Never);
        let p = Principal::new("jduke");
        assert!(manager.is_valid(Some(&p), Some(&Credential::from("theduke"))));
        assert!(!manager.is_valid(Some(&p), Some(&Credential::from("wrong"))));
        assert_eq!(auth.calls(), 2);
        // The good entry survives a failed attempt.
        assert!(manager.is_valid(Some(&p), Some(&Credential::from("theduke"))));
        assert_eq!(auth.calls(), 2);
    }

    #[test]
    fn disabled_cache_always_authenticates() {
        let (manager, auth) = manager(Lifetime::Disabled);
        let p = Principal::new("jduke");
        for _ in 0..3 {
            assert!(manager.is_valid(Some(&p), Some(&Credential::from("theduke"))));
        }
        assert_eq!(auth.calls(), 3);
        assert!(manager.cached_principals().is_empty());
    }

    #[test]
    fn failure_side_channel_is_replaced_per_attempt() {
        let (manager, _) = manager(Lifetime::Never);
        let p = Principal::new("jduke");
        assert!(!manager.is_valid(Some(&p), None));
        let failure = manager.last_failure().unwrap();
        assert_eq!(failure.principal.as_deref(), Some("jduke"));
        assert!(manager.is_valid(Some(&p), Some(&Credential::from("theduke"))));
        assert!(manager.last_failure().is_none());
    }

    #[test]
    fn authenticate_surfaces_reason() {
        let (manager, _) = manager(Lifetime::Never);
        let err = manager
            .authenticate(Some(&Principal::new("ghost")), None)
            .unwrap_err();
        assert!(matches!(err, CallerIdError::AuthenticationFailed(ref r) if r.contains("ghost")));
    }
}
