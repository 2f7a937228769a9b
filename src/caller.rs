//! Read-only view of the current caller, for authorization code.

use crate::association::{AssociationStore, RunAsIdentity};
use crate::identity::{Principal, Subject};
use crate::types::*;

/// Decides whether the current caller holds any of a set of roles.
pub trait RoleResolver: Send + Sync {
    fn has_role(
        &self,
        subject: Option<&Subject>,
        principal: Option<&Principal>,
        run_as: Option<&RunAsIdentity>,
        roles: &[&str],
    ) -> bool;
}

/// Resolves roles from the subject's `Roles` group. While a run-as identity
/// is active only its role counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubjectRoleResolver;

impl RoleResolver for SubjectRoleResolver {
    fn has_role(
        &self,
        subject: Option<&Subject>,
        _principal: Option<&Principal>,
        run_as: Option<&RunAsIdentity>,
        roles: &[&str],
    ) -> bool {
        if let Some(run_as) = run_as {
            return roles.iter().any(|r| *r == run_as.role_name());
        }
        subject.is_some_and(|s| roles.iter().any(|r| s.has_role(r)))
    }
}

/// The current caller as seen through an [`AssociationStore`].
#[derive(Clone)]
pub struct CallerContext {
    store: Arc<AssociationStore>,
    resolver: Arc<dyn RoleResolver>,
}

impl CallerContext {
    pub fn new(store: Arc<AssociationStore>) -> Self {
        Self::with_resolver(store, Arc::new(SubjectRoleResolver))
    }

    pub fn with_resolver(store: Arc<AssociationStore>, resolver: Arc<dyn RoleResolver>) -> Self {
        Self { store, resolver }
    }

    /// Principal of the top identity frame.
    pub fn current_principal(&self) -> Option<Principal> {
        self.store.principal()
    }

    pub fn current_subject(&self) -> Option<Subject> {
        self.store.subject()
    }

    /// Who the caller is acting as: the active run-as identity, else the
    /// subject's caller principal, else the authenticated principal.
    pub fn effective_caller_principal(&self) -> Option<Principal> {
        if let Ok(Some(run_as)) = self.store.peek_run_as(0) {
            return Some(run_as.principal());
        }
        let frame = self.store.peek()?;
        frame
            .subject()
            .and_then(Subject::caller_principal)
            .or(frame.principal())
            .cloned()
    }

    /// The run-as identity the caller itself was running under: the one
    /// beneath whatever the current callee pushed.
    pub fn caller_run_as(&self) -> Option<RunAsIdentity> {
        self.store.peek_run_as(1).ok().flatten()
    }

    /// Whether the caller holds any of `roles`.
    pub fn has_role(&self, roles: &[&str]) -> bool {
        let frame = self.store.peek();
        let run_as = self.store.peek_run_as(0).ok().flatten();
        self.resolver.has_role(
            frame.as_ref().and_then(|f| f.subject()),
            frame.as_ref().and_then(|f| f.principal()),
            run_as.as_ref(),
            roles,
        )
    }
}
