//! Principals, credentials and subjects: the values that flow through the
//! association store and the authentication cache.

pub mod credential;
pub mod principal;
pub mod subject;

pub use credential::{credentials_match, Credential, CustomCredential};
pub use principal::{Group, Principal, SubjectPrincipal, CALLER_PRINCIPAL_GROUP, ROLES_GROUP};
pub use subject::{derive_caller_principal, CopyMode, Subject};
