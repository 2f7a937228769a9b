use std::marker::PhantomData;

use crate::association::run_as::RunAsIdentity;
use crate::association::store::AssociationStore;
use crate::identity::{Credential, Principal, Subject};

/// Pops the frame it pushed when dropped, on every exit path.
///
/// Frames pushed above it by inner scopes that failed to clean up are
/// dropped too, so the stack is always restored to its depth at entry.
/// Not `Send`: a frame must be popped by the thread that pushed it.
#[derive(Debug)]
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct FrameGuard<'a> {
    store: &'a AssociationStore,
    restore_depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl<'a> FrameGuard<'a> {
    fn new(store: &'a AssociationStore, restore_depth: usize) -> Self {
        Self {
            store,
            restore_depth,
            _not_send: PhantomData,
        }
    }

    /// Stack depth this guard restores on drop.
    pub fn restore_depth(&self) -> usize {
        self.restore_depth
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        let dropped = self.store.truncate_frames(self.restore_depth);
        if dropped != 1 {
            tracing::warn!(
                dropped,
                depth = self.restore_depth,
                "identity scope ended with unbalanced frames"
            );
        }
    }
}

/// Pops the run-as identity it pushed when dropped.
#[must_use = "the run-as identity is popped as soon as the guard is dropped"]
pub struct RunAsGuard<'a> {
    store: &'a AssociationStore,
    restore_depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for RunAsGuard<'_> {
    fn drop(&mut self) {
        let dropped = self.store.truncate_run_as(self.restore_depth);
        if dropped != 1 {
            tracing::warn!(
                dropped,
                depth = self.restore_depth,
                "run-as scope ended with unbalanced identities"
            );
        }
    }
}

impl AssociationStore {
    /// [`push`](AssociationStore::push) for the lifetime of the returned guard.
    pub fn push_scoped(
        &self,
        subject: Option<Subject>,
        principal: Option<Principal>,
        credential: Option<Credential>,
    ) -> FrameGuard<'_> {
        let depth = self.depth();
        self.push(subject, principal, credential);
        FrameGuard::new(self, depth)
    }

    /// Protect the current frame from a nested scope. `None` if there is no frame.
    pub fn duplicate_scoped(&self) -> Option<FrameGuard<'_>> {
        let depth = self.depth();
        self.duplicate().then(|| FrameGuard::new(self, depth))
    }

    /// [`push_run_as`](AssociationStore::push_run_as) for the lifetime of the returned guard.
    pub fn run_as_scoped(&self, identity: RunAsIdentity) -> RunAsGuard<'_> {
        let restore_depth = self.run_as_depth();
        self.push_run_as(identity);
        RunAsGuard {
            store: self,
            restore_depth,
            _not_send: PhantomData,
        }
    }
}
