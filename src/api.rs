//! High-level programmatic API.
//!
//! [`SecurityDomain`] wires an [`AuthenticationManager`] to an association
//! store from a [`Config`], so a host can validate a caller, push its
//! identity for the unit of work and ask who the caller is.

use crate::association::{self, AssociationStore, FrameGuard, RunAsGuard, RunAsIdentity};
use crate::cache::{CachePolicy, Lifetime, SweeperHandle, TimedCachePolicy};
use crate::caller::{CallerContext, RoleResolver};
use crate::config::Config;
use crate::error::{AuthFailure, CallerIdError, Result};
use crate::identity::{Credential, Principal, Subject};
use crate::manager::{AuthenticationManager, Authenticator};
use crate::types::*;

/// One security domain: authentication cache, authenticator and the
/// association store its callers are pushed onto.
pub struct SecurityDomain {
    manager: AuthenticationManager,
    caller: CallerContext,
    _sweeper: Option<SweeperHandle>,
}

impl SecurityDomain {
    /// Build from config, installing the process-wide association store in
    /// the configured mode.
    pub fn from_config(config: &Config, authenticator: Arc<dyn Authenticator>) -> Result<Self> {
        let store = association::install(config.association.mode)?;
        Self::with_store(config, authenticator, store)
    }

    /// Build from config over an explicitly supplied store.
    pub fn with_store(
        config: &Config,
        authenticator: Arc<dyn Authenticator>,
        store: Arc<AssociationStore>,
    ) -> Result<Self> {
        config.validate()?;
        if store.mode() != config.association.mode {
            return Err(CallerIdError::ModeAlreadyInstalled {
                installed: store.mode().to_string(),
                requested: config.association.mode.to_string(),
            });
        }

        let lifetime = config.cache.lifetime();
        let policy = Arc::new(TimedCachePolicy::new(lifetime).with_capacity(config.cache.capacity));
        let sweeper = match lifetime {
            Lifetime::Expires(_) => Some(policy.start_sweeper(config.cache.sweep_interval()?)),
            Lifetime::Never | Lifetime::Disabled => None,
        };

        let manager = AuthenticationManager::new(
            config.manager.domain.clone(),
            authenticator,
            policy as Arc<dyn CachePolicy>,
            Arc::clone(&store),
        )
        .with_locking(config.manager.locking)
        .with_copy_mode(config.subject.copy_mode());

        tracing::info!(
            domain = %config.manager.domain,
            mode = %store.mode(),
            locking = %config.manager.locking,
            lifetime_secs = lifetime.as_secs(),
            "security domain ready"
        );
        Ok(Self {
            manager,
            caller: CallerContext::new(store),
            _sweeper: sweeper,
        })
    }

    /// Replace the default role resolver.
    pub fn with_role_resolver(mut self, resolver: Arc<dyn RoleResolver>) -> Self {
        self.caller = CallerContext::with_resolver(Arc::clone(self.associations()), resolver);
        self
    }

    pub fn manager(&self) -> &AuthenticationManager {
        &self.manager
    }

    pub fn associations(&self) -> &Arc<AssociationStore> {
        self.manager.associations()
    }

    pub fn caller(&self) -> &CallerContext {
        &self.caller
    }

    pub fn is_valid(&self, principal: Option<&Principal>, credential: Option<&Credential>) -> bool {
        self.manager.is_valid(principal, credential)
    }

    /// Validate the caller and push its identity until the guard drops.
    pub fn login(
        &self,
        principal: Option<&Principal>,
        credential: Option<&Credential>,
    ) -> Result<FrameGuard<'_>> {
        let mut subject = Subject::new();
        if !self.manager.is_valid_into(principal, credential, &mut subject) {
            let reason = self
                .last_failure()
                .map(|f| f.reason)
                .unwrap_or_else(|| "authentication failed".to_string());
            return Err(CallerIdError::AuthenticationFailed(reason));
        }
        Ok(self.associations().push_scoped(
            Some(subject),
            principal.cloned(),
            credential.cloned(),
        ))
    }

    /// Act as `principal_name` in `role_name` until the guard drops.
    pub fn run_as(&self, role_name: &str, principal_name: &str) -> RunAsGuard<'_> {
        self.associations()
            .run_as_scoped(RunAsIdentity::new(role_name, principal_name))
    }

    pub fn last_failure(&self) -> Option<AuthFailure> {
        self.manager.last_failure()
    }

    pub fn flush(&self) {
        self.manager.flush_cache();
    }
}
