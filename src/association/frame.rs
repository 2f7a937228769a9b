use crate::identity::{Credential, Principal, Subject};

/// Which fields of a frame were explicitly written in its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetFlags(u8);

impl SetFlags {
    pub const PRINCIPAL: SetFlags = SetFlags(0b001);
    pub const CREDENTIAL: SetFlags = SetFlags(0b010);
    pub const SUBJECT: SetFlags = SetFlags(0b100);
    pub const ALL: SetFlags = SetFlags(0b111);

    pub fn empty() -> Self {
        SetFlags(0)
    }

    pub fn contains(self, other: SetFlags) -> bool {
        self.0 & other.0 == other.0
    }

    fn insert(&mut self, other: SetFlags) {
        self.0 |= other.0;
    }
}

/// One element of the association stack.
///
/// A field that has been set in a frame is never overwritten: a second write
/// layers a new frame on top so popping it restores the previous value.
/// Unset fields of a layered frame carry the values of the frame beneath.
#[derive(Debug, Clone, Default)]
pub struct IdentityFrame {
    principal: Option<Principal>,
    credential: Option<Credential>,
    subject: Option<Subject>,
    flags: SetFlags,
}

impl IdentityFrame {
    /// A fully set frame, as pushed when a nested login scope begins.
    pub fn new(
        subject: Option<Subject>,
        principal: Option<Principal>,
        credential: Option<Credential>,
    ) -> Self {
        Self {
            principal,
            credential,
            subject,
            flags: SetFlags::ALL,
        }
    }

    /// An unflagged frame carrying `below`'s values.
    pub(crate) fn layered_on(below: Option<&IdentityFrame>) -> Self {
        match below {
            Some(frame) => Self {
                principal: frame.principal.clone(),
                credential: frame.credential.clone(),
                subject: frame.subject.clone(),
                flags: SetFlags::empty(),
            },
            None => Self::default(),
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    pub fn flags(&self) -> SetFlags {
        self.flags
    }

    pub fn is_set(&self, flag: SetFlags) -> bool {
        self.flags.contains(flag)
    }

    pub(crate) fn set_principal(&mut self, principal: Option<Principal>) {
        self.principal = principal;
        self.flags.insert(SetFlags::PRINCIPAL);
    }

    pub(crate) fn set_credential(&mut self, credential: Option<Credential>) {
        self.credential = credential;
        self.flags.insert(SetFlags::CREDENTIAL);
    }

    pub(crate) fn set_subject(&mut self, subject: Option<Subject>) {
        self.subject = subject;
        self.flags.insert(SetFlags::SUBJECT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_frame_has_every_flag() {
        let f = IdentityFrame::new(None, Some(Principal::new("a")), None);
        assert!(f.is_set(SetFlags::PRINCIPAL));
        assert!(f.is_set(SetFlags::CREDENTIAL));
        assert!(f.is_set(SetFlags::SUBJECT));
    }

    #[test]
    fn layered_frame_carries_values_without_flags() {
        let mut below = IdentityFrame::default();
        below.set_principal(Some(Principal::new("a")));
        let layered = IdentityFrame::layered_on(Some(&below));
        assert_eq!(layered.principal(), Some(&Principal::new("a")));
        assert_eq!(layered.flags(), SetFlags::empty());
    }
}
