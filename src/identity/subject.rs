use crate::identity::credential::Credential;
use crate::identity::principal::{
    Group, Principal, SubjectPrincipal, CALLER_PRINCIPAL_GROUP, ROLES_GROUP,
};
use crate::types::*;

/// How a subject's principal and credential sets are handed to another context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyMode {
    /// Share the underlying sets. Later writes on either side copy on write,
    /// but custom credentials stay shared.
    Shallow,
    /// Independent copies, including duplicated custom credentials.
    #[default]
    Deep,
}

impl CopyMode {
    pub fn from_deep_flag(deep: bool) -> Self {
        if deep {
            CopyMode::Deep
        } else {
            CopyMode::Shallow
        }
    }
}

/// The authenticated result bundle: principals (including role and caller
/// groups) plus the credentials established by authentication.
#[derive(Debug, Clone, Default)]
pub struct Subject {
    principals: Arc<Vec<SubjectPrincipal>>,
    public_credentials: Arc<Vec<Credential>>,
    private_credentials: Arc<Vec<Credential>>,
}

impl Subject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(mut self, principal: impl Into<SubjectPrincipal>) -> Self {
        self.add_principal(principal);
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for role in roles {
            self.add_role(role);
        }
        self
    }

    pub fn with_private_credential(mut self, credential: Credential) -> Self {
        Arc::make_mut(&mut self.private_credentials).push(credential);
        self
    }

    /// Add to the principal set. Returns false if an equal principal is present.
    pub fn add_principal(&mut self, principal: impl Into<SubjectPrincipal>) -> bool {
        let principal = principal.into();
        if self.principals.contains(&principal) {
            return false;
        }
        Arc::make_mut(&mut self.principals).push(principal);
        true
    }

    /// Add a role to the `Roles` group, creating the group if needed.
    pub fn add_role(&mut self, role: impl Into<String>) {
        let role = Principal::new(role);
        self.update_group(ROLES_GROUP, |group| {
            group.add_member(role);
        });
    }

    /// Mark `principal` as the caller principal of this subject.
    pub fn set_caller_principal(&mut self, principal: Principal) {
        self.update_group(CALLER_PRINCIPAL_GROUP, |group| {
            if !group.is_member(principal.name()) {
                *group = Group::new(CALLER_PRINCIPAL_GROUP);
                group.add_member(principal);
            }
        });
    }

    pub fn add_public_credential(&mut self, credential: Credential) {
        Arc::make_mut(&mut self.public_credentials).push(credential);
    }

    pub fn add_private_credential(&mut self, credential: Credential) {
        Arc::make_mut(&mut self.private_credentials).push(credential);
    }

    pub fn principals(&self) -> &[SubjectPrincipal] {
        &self.principals
    }

    pub fn public_credentials(&self) -> &[Credential] {
        &self.public_credentials
    }

    pub fn private_credentials(&self) -> &[Credential] {
        &self.private_credentials
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
            && self.public_credentials.is_empty()
            && self.private_credentials.is_empty()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.principals
            .iter()
            .filter_map(SubjectPrincipal::as_group)
            .find(|g| g.name() == name)
    }

    pub fn roles(&self) -> Option<&Group> {
        self.group(ROLES_GROUP)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles().is_some_and(|g| g.is_member(role))
    }

    /// Principals that are not groups, in insertion order.
    pub fn plain_principals(&self) -> impl Iterator<Item = &Principal> {
        self.principals.iter().filter_map(SubjectPrincipal::as_principal)
    }

    /// The first member of the caller principal group, if the subject has one.
    pub fn caller_principal(&self) -> Option<&Principal> {
        self.group(CALLER_PRINCIPAL_GROUP)
            .and_then(|g| g.members().first())
    }

    /// Copy this subject's sets into `target`, merging with what it holds.
    pub fn copy_into(&self, target: &mut Subject, mode: CopyMode) {
        if target.is_empty() {
            *target = self.copy(mode);
            return;
        }
        for principal in self.principals.iter() {
            target.add_principal(principal.clone());
        }
        let deep = mode == CopyMode::Deep;
        for credential in self.public_credentials.iter() {
            target.add_public_credential(credential.copy(deep));
        }
        for credential in self.private_credentials.iter() {
            target.add_private_credential(credential.copy(deep));
        }
    }

    /// A copy suitable for handing to another execution context.
    pub fn copy(&self, mode: CopyMode) -> Subject {
        match mode {
            CopyMode::Shallow => self.clone(),
            CopyMode::Deep => Subject {
                principals: Arc::new(self.principals.as_ref().clone()),
                public_credentials: Arc::new(
                    self.public_credentials.iter().map(|c| c.copy(true)).collect(),
                ),
                private_credentials: Arc::new(
                    self.private_credentials.iter().map(|c| c.copy(true)).collect(),
                ),
            },
        }
    }

    /// Whether both subjects share the same principal set allocation.
    pub fn shares_principals_with(&self, other: &Subject) -> bool {
        Arc::ptr_eq(&self.principals, &other.principals)
    }

    /// Run `f` on the named group, appending a new group when there is none.
    fn update_group(&mut self, name: &str, f: impl FnOnce(&mut Group)) {
        let principals = Arc::make_mut(&mut self.principals);
        let existing = principals.iter_mut().find_map(|p| match p {
            SubjectPrincipal::Group(g) if g.name() == name => Some(g),
            _ => None,
        });
        match existing {
            Some(group) => f(group),
            None => {
                let mut group = Group::new(name);
                f(&mut group);
                principals.push(SubjectPrincipal::Group(group));
            }
        }
    }
}

/// Pick the caller principal for a freshly authenticated subject.
///
/// The `CallerPrincipal` group wins. Anonymous logins with no such group fall
/// back to the first plain principal the subject carries.
pub fn derive_caller_principal(
    subject: &Subject,
    presented: Option<&Principal>,
) -> Option<Principal> {
    if let Some(caller) = subject.caller_principal() {
        return Some(caller.clone());
    }
    match presented {
        None => subject.plain_principals().next().cloned(),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jduke() -> Subject {
        Subject::new()
            .with_principal(Principal::new("jduke"))
            .with_roles(["Echo", "Admin"])
            .with_private_credential(Credential::from("theduke"))
    }

    #[test]
    fn roles_land_in_roles_group() {
        let s = jduke();
        assert!(s.has_role("Echo"));
        assert!(s.has_role("Admin"));
        assert!(!s.has_role("jduke"));
        assert_eq!(s.plain_principals().count(), 1);
    }

    #[test]
    fn groups_are_created_once_and_updated_in_place() {
        let mut s = jduke();
        s.add_role("Echo");
        s.set_caller_principal(Principal::new("first@corp"));
        s.set_caller_principal(Principal::new("second@corp"));
        let groups = s
            .principals()
            .iter()
            .filter(|p| matches!(p, SubjectPrincipal::Group(_)))
            .count();
        assert_eq!(groups, 2);
        assert_eq!(s.roles().unwrap().members().len(), 2);
        assert_eq!(s.caller_principal(), Some(&Principal::new("second@corp")));
        assert_eq!(s.group(CALLER_PRINCIPAL_GROUP).unwrap().members().len(), 1);
    }

    #[test]
    fn caller_group_takes_precedence() {
        let mut s = jduke();
        s.set_caller_principal(Principal::new("duke@corp"));
        let caller = derive_caller_principal(&s, Some(&Principal::new("jduke")));
        assert_eq!(caller, Some(Principal::new("duke@corp")));
    }

    #[test]
    fn anonymous_falls_back_to_first_plain_principal() {
        let s = jduke();
        assert_eq!(derive_caller_principal(&s, None), Some(Principal::new("jduke")));
        assert_eq!(derive_caller_principal(&s, Some(&Principal::new("jduke"))), None);
    }

    #[test]
    fn deep_copy_does_not_share_sets() {
        let s = jduke();
        let deep = s.copy(CopyMode::Deep);
        let shallow = s.copy(CopyMode::Shallow);
        assert!(!deep.shares_principals_with(&s));
        assert!(shallow.shares_principals_with(&s));
    }

    #[test]
    fn writes_after_shallow_copy_do_not_leak_back() {
        let s = jduke();
        let mut shallow = s.copy(CopyMode::Shallow);
        shallow.add_role("Intruder");
        assert!(shallow.has_role("Intruder"));
        assert!(!s.has_role("Intruder"));
    }

    #[test]
    fn copy_into_merges_without_duplicates() {
        let source = jduke();
        let mut target = Subject::new().with_principal(Principal::new("jduke"));
        source.copy_into(&mut target, CopyMode::Deep);
        assert_eq!(target.plain_principals().count(), 1);
        assert!(target.has_role("Echo"));
        assert_eq!(target.private_credentials().len(), 1);
    }
}
