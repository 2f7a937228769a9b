//! An in-memory authenticator backed by a static users table.
//!
//! Useful for tests, demos and small deployments. The table is usually read
//! from a TOML file:
//!
//! ```toml
//! [anonymous]
//! name = "guest"
//! roles = ["Public"]
//!
//! [[users]]
//! name = "jduke"
//! password = "theduke"
//! roles = ["Echo", "Admin"]
//! caller = "duke@corp"
//! ```

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use secrecy::{ExposeSecret, SecretString};

use crate::error::{CallerIdError, Result};
use crate::identity::{Credential, Principal, Subject};
use crate::manager::authenticator::{Authenticated, Authenticator};
use crate::types::*;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct UsersFile {
    /// Identity given to anonymous callers. Anonymous access is refused if absent.
    pub anonymous: Option<AnonymousIdentity>,
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserEntry {
    pub name: String,
    pub password: SecretString,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Caller principal name, when it differs from the login name.
    #[serde(default)]
    pub caller: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnonymousIdentity {
    pub name: String,
    pub roles: Vec<String>,
}

impl Default for AnonymousIdentity {
    fn default() -> Self {
        Self {
            name: "anonymous".to_string(),
            roles: Vec::new(),
        }
    }
}

impl UsersFile {
    /// Load a users table. Unlike config, a missing file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CallerIdError::Config(format!("Invalid users file {}: {}", path.display(), e)))
    }
}

/// Verifies principals against a fixed table.
pub struct StaticAuthenticator {
    users: HashMap<String, UserEntry>,
    anonymous: Option<AnonymousIdentity>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::from_users(UsersFile::default())
    }

    pub fn from_users(file: UsersFile) -> Self {
        let users = file
            .users
            .into_iter()
            .map(|u| (u.name.clone(), u))
            .collect();
        Self {
            users,
            anonymous: file.anonymous,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_users(UsersFile::load(path)?))
    }

    pub fn with_user<I, S>(mut self, name: &str, password: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = UserEntry {
            name: name.to_string(),
            password: SecretString::new(password.to_string()),
            roles: roles.into_iter().map(Into::into).collect(),
            caller: None,
        };
        self.users.insert(name.to_string(), entry);
        self
    }

    pub fn allow_anonymous<I, S>(mut self, name: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.anonymous = Some(AnonymousIdentity {
            name: name.to_string(),
            roles: roles.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Simulate a slow back end.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `authenticate` has run.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl Default for StaticAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(
        &self,
        principal: Option<&Principal>,
        credential: Option<&Credential>,
    ) -> Result<Authenticated> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let Some(principal) = principal else {
            let anonymous = self.anonymous.as_ref().ok_or_else(|| {
                CallerIdError::AuthenticationFailed("anonymous access is not permitted".into())
            })?;
            let subject = Subject::new()
                .with_principal(Principal::new(anonymous.name.clone()))
                .with_roles(anonymous.roles.iter().cloned());
            return Ok(Authenticated::new(subject));
        };

        let user = self.users.get(principal.name()).ok_or_else(|| {
            CallerIdError::AuthenticationFailed(format!("unknown principal '{}'", principal))
        })?;
        let expected = Credential::from(user.password.expose_secret().as_str());
        match credential {
            Some(given) if expected.matches(given) => {}
            Some(_) => {
                return Err(CallerIdError::AuthenticationFailed(format!(
                    "bad credential for '{}'",
                    principal
                )))
            }
            None => {
                return Err(CallerIdError::AuthenticationFailed(format!(
                    "no credential presented for '{}'",
                    principal
                )))
            }
        }

        let mut subject = Subject::new()
            .with_principal(principal.clone())
            .with_roles(user.roles.iter().cloned());
        if let Some(caller) = &user.caller {
            subject.set_caller_principal(Principal::new(caller.clone()));
        }
        if let Some(given) = credential {
            subject.add_private_credential(given.copy(true));
        }
        Ok(Authenticated::new(subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: &str = r#"
        [anonymous]
        name = "guest"
        roles = ["Public"]

        [[users]]
        name = "jduke"
        password = "theduke"
        roles = ["Echo"]
        caller = "duke@corp"
    "#;

    fn authenticator() -> StaticAuthenticator {
        StaticAuthenticator::from_users(toml::from_str(USERS).unwrap())
    }

    #[test]
    fn accepts_string_or_char_password() {
        let auth = authenticator();
        let p = Principal::new("jduke");
        let ok = auth
            .authenticate(Some(&p), Some(&Credential::from("theduke")))
            .unwrap();
        assert!(ok.subject.has_role("Echo"));
        assert_eq!(ok.subject.caller_principal(), Some(&Principal::new("duke@corp")));
        assert!(auth
            .authenticate(Some(&p), Some(&Credential::password("theduke")))
            .is_ok());
        assert_eq!(auth.calls(), 2);
    }

    #[test]
    fn rejects_bad_or_missing_credentials() {
        let auth = authenticator();
        let p = Principal::new("jduke");
        assert!(auth.authenticate(Some(&p), Some(&Credential::from("nope"))).is_err());
        assert!(auth.authenticate(Some(&p), None).is_err());
        let err = auth
            .authenticate(Some(&Principal::new("nobody")), None)
            .unwrap_err();
        assert!(err.to_string().contains("unknown principal"));
    }

    #[test]
    fn anonymous_identity() {
        let auth = authenticator();
        let anon = auth.authenticate(None, None).unwrap();
        assert!(anon.subject.has_role("Public"));
        assert!(StaticAuthenticator::new().authenticate(None, None).is_err());
    }
}
