use std::fmt;

use parking_lot::Mutex;

use crate::cache::CacheKey;
use crate::error::{CallerIdError, Result};
use crate::identity::{Credential, Principal, Subject};
use crate::types::*;

/// The login state backing a cached identity, torn down when the entry dies.
pub trait LoginSession: Send + Sync + fmt::Debug {
    fn logout(&self) -> Result<()>;
}

/// For authenticators that hold nothing that needs tearing down.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSession;

impl LoginSession for NoSession {
    fn logout(&self) -> Result<()> {
        Ok(())
    }
}

/// How long a cache entry stays current, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Never expires; removed only by explicit invalidation.
    Never,
    /// Do not cache at all.
    Disabled,
    Expires(Duration),
}

impl Lifetime {
    /// Negative values mean "never expires", zero disables caching.
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            s if s < 0 => Lifetime::Never,
            0 => Lifetime::Disabled,
            s => Lifetime::Expires(Duration::from_secs(s.unsigned_abs())),
        }
    }

    pub fn as_secs(&self) -> i64 {
        match self {
            Lifetime::Never => -1,
            Lifetime::Disabled => 0,
            Lifetime::Expires(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        }
    }

    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Lifetime::Disabled)
    }

    fn deadline(&self, now: Instant) -> Result<Option<Instant>> {
        match self {
            Lifetime::Never => Ok(None),
            Lifetime::Disabled => Err(CallerIdError::InvalidLifetime(0)),
            Lifetime::Expires(d) => match now.checked_add(*d) {
                Some(at) => Ok(Some(at)),
                // Too far out to represent: treat as never expiring.
                None => Ok(None),
            },
        }
    }
}

/// Where an entry is in its teardown lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Live { active: usize },
    /// Destruction was requested while in use; the last release tears it down.
    PendingDestroy { active: usize },
    Destroyed,
}

/// A cached authentication result for one principal.
pub struct DomainInfo {
    key: CacheKey,
    subject: Subject,
    credential: Option<Credential>,
    caller_principal: Option<Principal>,
    session: Box<dyn LoginSession>,
    created_at: DateTime<Utc>,
    expires_at: Option<Instant>,
    state: Mutex<EntryState>,
}

impl fmt::Debug for DomainInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainInfo")
            .field("key", &self.key)
            .field("caller_principal", &self.caller_principal)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl DomainInfo {
    /// Build an entry. A `Disabled` lifetime cannot produce an entry.
    pub fn new(
        key: CacheKey,
        subject: Subject,
        credential: Option<Credential>,
        caller_principal: Option<Principal>,
        session: Box<dyn LoginSession>,
        lifetime: Lifetime,
        now: Instant,
    ) -> Result<Self> {
        let expires_at = lifetime.deadline(now)?;
        Ok(Self {
            key,
            subject,
            credential,
            caller_principal,
            session,
            created_at: Utc::now(),
            expires_at,
            state: Mutex::new(EntryState::Live { active: 0 }),
        })
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn caller_principal(&self) -> Option<&Principal> {
        self.caller_principal.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub fn is_current(&self, now: Instant) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => at > now,
        }
    }

    pub fn state(&self) -> EntryState {
        *self.state.lock()
    }

    pub fn active_users(&self) -> usize {
        match self.state() {
            EntryState::Live { active } | EntryState::PendingDestroy { active } => active,
            EntryState::Destroyed => 0,
        }
    }

    /// Register a user. Fails once destruction has been requested.
    pub fn acquire(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            EntryState::Live { active } => {
                *state = EntryState::Live { active: active + 1 };
                true
            }
            EntryState::PendingDestroy { .. } | EntryState::Destroyed => false,
        }
    }

    /// Unregister a user; the last release of a pending entry tears it down.
    pub fn release(&self) {
        let teardown = {
            let mut state = self.state.lock();
            match *state {
                EntryState::Live { active } if active > 0 => {
                    *state = EntryState::Live { active: active - 1 };
                    false
                }
                EntryState::PendingDestroy { active } if active > 1 => {
                    *state = EntryState::PendingDestroy { active: active - 1 };
                    false
                }
                EntryState::PendingDestroy { .. } => {
                    *state = EntryState::Destroyed;
                    true
                }
                EntryState::Live { .. } | EntryState::Destroyed => {
                    tracing::warn!(key = %self.key, state = ?*state, "release without matching acquire");
                    false
                }
            }
        };
        if teardown {
            self.teardown();
        }
    }

    /// Tear down now if unused, otherwise once the last user releases.
    pub fn destroy(&self) {
        let teardown = {
            let mut state = self.state.lock();
            match *state {
                EntryState::Live { active: 0 } => {
                    *state = EntryState::Destroyed;
                    true
                }
                EntryState::Live { active } => {
                    tracing::debug!(key = %self.key, active, "deferring teardown of in-use entry");
                    *state = EntryState::PendingDestroy { active };
                    false
                }
                EntryState::PendingDestroy { .. } | EntryState::Destroyed => false,
            }
        };
        if teardown {
            self.teardown();
        }
    }

    // The state is already Destroyed here, so this runs at most once.
    fn teardown(&self) {
        tracing::info!(key = %self.key, "tearing down cached login");
        if let Err(e) = self.session.logout() {
            tracing::warn!(key = %self.key, error = %e, "logout of cached login failed");
        }
    }
}
