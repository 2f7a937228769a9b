use crate::cache::{LoginSession, NoSession};
use crate::error::Result;
use crate::identity::{Credential, Principal, Subject};

/// What a successful authentication hands back.
#[derive(Debug)]
pub struct Authenticated {
    pub subject: Subject,
    /// Torn down when the cached result is evicted.
    pub session: Box<dyn LoginSession>,
}

impl Authenticated {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            session: Box::new(NoSession),
        }
    }

    pub fn with_session(mut self, session: impl LoginSession + 'static) -> Self {
        self.session = Box::new(session);
        self
    }
}

/// The pluggable verification strategy behind the cache.
///
/// A `None` principal is an anonymous attempt. Declines are reported as
/// [`CallerIdError::AuthenticationFailed`](crate::error::CallerIdError::AuthenticationFailed).
pub trait Authenticator: Send + Sync {
    fn authenticate(
        &self,
        principal: Option<&Principal>,
        credential: Option<&Credential>,
    ) -> Result<Authenticated>;
}

impl<F> Authenticator for F
where
    F: Fn(Option<&Principal>, Option<&Credential>) -> Result<Authenticated> + Send + Sync,
{
    fn authenticate(
        &self,
        principal: Option<&Principal>,
        credential: Option<&Credential>,
    ) -> Result<Authenticated> {
        self(principal, credential)
    }
}
