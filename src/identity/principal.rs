use std::fmt;

use crate::types::*;

/// Name of the group whose first member is the caller principal of a subject.
pub const CALLER_PRINCIPAL_GROUP: &str = "CallerPrincipal";

/// Name of the group holding a subject's role principals.
pub const ROLES_GROUP: &str = "Roles";

/// An identifier for "who": a user, a service or a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal {
    name: String,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Principal {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Principal {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A named set of principals (roles, or the caller principal marker).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Group {
    name: String,
    members: Vec<Principal>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Build a group from member names, skipping duplicates.
    pub fn with_members<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut group = Self::new(name);
        for member in members {
            group.add_member(Principal::new(member));
        }
        group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a member. Returns false if it was already present.
    pub fn add_member(&mut self, member: Principal) -> bool {
        if self.members.contains(&member) {
            return false;
        }
        self.members.push(member);
        true
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name() == name)
    }

    pub fn members(&self) -> &[Principal] {
        &self.members
    }
}

/// An element of a subject's principal set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectPrincipal {
    Principal(Principal),
    Group(Group),
}

impl SubjectPrincipal {
    pub fn name(&self) -> &str {
        match self {
            SubjectPrincipal::Principal(p) => p.name(),
            SubjectPrincipal::Group(g) => g.name(),
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            SubjectPrincipal::Group(g) => Some(g),
            SubjectPrincipal::Principal(_) => None,
        }
    }

    pub fn as_principal(&self) -> Option<&Principal> {
        match self {
            SubjectPrincipal::Principal(p) => Some(p),
            SubjectPrincipal::Group(_) => None,
        }
    }
}

impl From<Principal> for SubjectPrincipal {
    fn from(p: Principal) -> Self {
        SubjectPrincipal::Principal(p)
    }
}

impl From<Group> for SubjectPrincipal {
    fn from(g: Group) -> Self {
        SubjectPrincipal::Group(g)
    }
}
