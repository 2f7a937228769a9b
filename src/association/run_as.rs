use std::fmt;

use crate::identity::Principal;

/// A temporary override of the effective caller for a bounded scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunAsIdentity {
    role_name: String,
    principal_name: String,
}

impl RunAsIdentity {
    pub fn new(role_name: impl Into<String>, principal_name: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            principal_name: principal_name.into(),
        }
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    pub fn principal_name(&self) -> &str {
        &self.principal_name
    }

    /// The principal a callee observes as its caller.
    pub fn principal(&self) -> Principal {
        Principal::new(self.principal_name.clone())
    }
}

impl fmt::Display for RunAsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (run-as {})", self.principal_name, self.role_name)
    }
}
