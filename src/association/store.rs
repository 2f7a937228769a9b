use std::fmt;
use std::thread::{self, JoinHandle, ThreadId};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::association::frame::{IdentityFrame, SetFlags};
use crate::association::run_as::RunAsIdentity;
use crate::error::{AuthFailure, CallerIdError, Result};
use crate::identity::{Credential, Principal, Subject};
use crate::types::*;

/// How identities are scoped across threads. Chosen once, before first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMode {
    /// One process-wide slot seen by every thread. The host must serialize access.
    Shared,
    /// One context per thread; spawned threads start empty.
    #[default]
    Isolated,
    /// One context per thread; spawned threads start with a copy of the parent's stack.
    IsolatedInheriting,
}

impl AssociationMode {
    pub fn is_isolated(self) -> bool {
        !matches!(self, AssociationMode::Shared)
    }
}

impl fmt::Display for AssociationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssociationMode::Shared => "shared",
            AssociationMode::Isolated => "isolated",
            AssociationMode::IsolatedInheriting => "isolated_inheriting",
        };
        f.write_str(name)
    }
}

/// Everything one execution context knows about its caller.
#[derive(Debug, Default)]
struct ContextState {
    frames: Vec<IdentityFrame>,
    run_as: Vec<RunAsIdentity>,
    last_failure: Option<AuthFailure>,
}

impl ContextState {
    fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.run_as.is_empty() && self.last_failure.is_none()
    }

    /// The frame a setter for `flag` writes into, layering a new one when
    /// the current top already has that field set.
    fn writable_top(&mut self, flag: SetFlags) -> &mut IdentityFrame {
        let needs_layer = match self.frames.last() {
            Some(top) => top.is_set(flag),
            None => true,
        };
        if needs_layer {
            let layered = IdentityFrame::layered_on(self.frames.last());
            self.frames.push(layered);
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

enum Storage {
    Shared(Mutex<ContextState>),
    Isolated(DashMap<ThreadId, ContextState>),
}

/// Identity frames captured from a parent context for a child thread.
#[derive(Debug, Default)]
pub struct ForkSnapshot {
    frames: Vec<IdentityFrame>,
}

impl ForkSnapshot {
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Per-context stacks of authenticated identities and run-as overrides.
///
/// Readers always see the top frame; there is no separate "current" slot to
/// keep in sync, so popping a frame restores the previous identity at once.
pub struct AssociationStore {
    mode: AssociationMode,
    storage: Storage,
}

impl fmt::Debug for AssociationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationStore")
            .field("mode", &self.mode)
            .field("contexts", &self.active_contexts())
            .finish()
    }
}

impl AssociationStore {
    pub fn new(mode: AssociationMode) -> Self {
        let storage = match mode {
            AssociationMode::Shared => Storage::Shared(Mutex::new(ContextState::default())),
            AssociationMode::Isolated | AssociationMode::IsolatedInheriting => {
                Storage::Isolated(DashMap::new())
            }
        };
        Self { mode, storage }
    }

    pub fn mode(&self) -> AssociationMode {
        self.mode
    }

    /// Number of contexts currently holding state.
    pub fn active_contexts(&self) -> usize {
        match &self.storage {
            Storage::Shared(state) => usize::from(!state.lock().is_empty()),
            Storage::Isolated(map) => map.len(),
        }
    }

    fn with_context<R>(&self, f: impl FnOnce(&mut ContextState) -> R) -> R {
        match &self.storage {
            Storage::Shared(state) => f(&mut *state.lock()),
            Storage::Isolated(map) => {
                let id = thread::current().id();
                let out = {
                    let mut entry = map.entry(id).or_default();
                    f(entry.value_mut())
                };
                // The shard lock is released above; a balanced scope leaves no entry behind.
                map.remove_if(&id, |_, ctx| ctx.is_empty());
                out
            }
        }
    }

    fn read_context<R>(&self, f: impl FnOnce(Option<&ContextState>) -> R) -> R {
        match &self.storage {
            Storage::Shared(state) => {
                let guard = state.lock();
                f(Some(&*guard))
            }
            Storage::Isolated(map) => match map.get(&thread::current().id()) {
                Some(entry) => f(Some(entry.value())),
                None => f(None),
            },
        }
    }

    fn top<R>(&self, f: impl FnOnce(&IdentityFrame) -> Option<R>) -> Option<R> {
        self.read_context(|ctx| ctx.and_then(|c| c.frames.last()).and_then(f))
    }

    // ── identity frames ─────────────────────────────────────────────────

    pub fn set_principal(&self, principal: Option<Principal>) {
        self.with_context(|ctx| ctx.writable_top(SetFlags::PRINCIPAL).set_principal(principal));
    }

    pub fn set_credential(&self, credential: Option<Credential>) {
        self.with_context(|ctx| {
            ctx.writable_top(SetFlags::CREDENTIAL)
                .set_credential(credential)
        });
    }

    pub fn set_subject(&self, subject: Option<Subject>) {
        self.with_context(|ctx| ctx.writable_top(SetFlags::SUBJECT).set_subject(subject));
    }

    pub fn principal(&self) -> Option<Principal> {
        self.top(|f| f.principal().cloned())
    }

    pub fn credential(&self) -> Option<Credential> {
        self.top(|f| f.credential().cloned())
    }

    pub fn subject(&self) -> Option<Subject> {
        self.top(|f| f.subject().cloned())
    }

    /// Start a new, fully set frame.
    pub fn push(
        &self,
        subject: Option<Subject>,
        principal: Option<Principal>,
        credential: Option<Credential>,
    ) {
        tracing::debug!(
            principal = principal.as_ref().map(Principal::name),
            "push identity frame"
        );
        let frame = IdentityFrame::new(subject, principal, credential);
        self.with_context(|ctx| ctx.frames.push(frame));
    }

    /// Push a copy of the top frame. Returns false (and does nothing) if there is none.
    pub fn duplicate(&self) -> bool {
        self.with_context(|ctx| match ctx.frames.last().cloned() {
            Some(copy) => {
                ctx.frames.push(copy);
                true
            }
            None => false,
        })
    }

    /// Remove and return the top frame; the frame beneath becomes current.
    pub fn pop(&self) -> Result<IdentityFrame> {
        self.with_context(|ctx| ctx.frames.pop())
            .ok_or(CallerIdError::EmptyStack("identity"))
    }

    pub fn peek(&self) -> Option<IdentityFrame> {
        self.top(|f| Some(f.clone()))
    }

    pub fn depth(&self) -> usize {
        self.read_context(|ctx| ctx.map_or(0, |c| c.frames.len()))
    }

    /// Drop frames above `depth`. Returns how many were dropped.
    pub(crate) fn truncate_frames(&self, depth: usize) -> usize {
        self.with_context(|ctx| {
            let dropped = ctx.frames.len().saturating_sub(depth);
            ctx.frames.truncate(depth);
            dropped
        })
    }

    /// Forget everything this context holds (frames, run-as stack, failure).
    pub fn clear(&self) {
        match &self.storage {
            Storage::Shared(state) => *state.lock() = ContextState::default(),
            Storage::Isolated(map) => {
                map.remove(&thread::current().id());
            }
        }
    }

    // ── run-as ──────────────────────────────────────────────────────────

    pub fn push_run_as(&self, identity: RunAsIdentity) {
        tracing::debug!(run_as = %identity, "push run-as");
        self.with_context(|ctx| ctx.run_as.push(identity));
    }

    pub fn pop_run_as(&self) -> Result<RunAsIdentity> {
        self.with_context(|ctx| ctx.run_as.pop())
            .ok_or(CallerIdError::EmptyStack("run-as"))
    }

    /// `depth` 0 is the identity a callee assumes; 1 is the one the current
    /// caller itself runs as. Deeper look-back is not supported.
    pub fn peek_run_as(&self, depth: usize) -> Result<Option<RunAsIdentity>> {
        if depth > 1 {
            return Err(CallerIdError::RunAsDepth(depth));
        }
        Ok(self.read_context(|ctx| {
            ctx.and_then(|c| {
                let len = c.run_as.len();
                len.checked_sub(depth + 1).map(|i| c.run_as[i].clone())
            })
        }))
    }

    pub fn run_as_depth(&self) -> usize {
        self.read_context(|ctx| ctx.map_or(0, |c| c.run_as.len()))
    }

    pub(crate) fn truncate_run_as(&self, depth: usize) -> usize {
        self.with_context(|ctx| {
            let dropped = ctx.run_as.len().saturating_sub(depth);
            ctx.run_as.truncate(depth);
            dropped
        })
    }

    // ── authentication failure side channel ─────────────────────────────

    pub fn record_auth_failure(&self, failure: AuthFailure) {
        self.with_context(|ctx| ctx.last_failure = Some(failure));
    }

    pub fn clear_auth_failure(&self) {
        if self.read_context(|ctx| ctx.is_some_and(|c| c.last_failure.is_some())) {
            self.with_context(|ctx| ctx.last_failure = None);
        }
    }

    pub fn last_auth_failure(&self) -> Option<AuthFailure> {
        self.read_context(|ctx| ctx.and_then(|c| c.last_failure.clone()))
    }

    pub fn take_auth_failure(&self) -> Option<AuthFailure> {
        self.with_context(|ctx| ctx.last_failure.take())
    }

    // ── propagation into child threads ──────────────────────────────────

    /// Capture what a child of the calling thread should start with.
    ///
    /// Only the inheriting mode copies anything. The copy never shares frame
    /// storage with the parent; if it cannot be made, the child starts empty.
    pub fn fork(&self) -> ForkSnapshot {
        if self.mode != AssociationMode::IsolatedInheriting {
            return ForkSnapshot::default();
        }
        let copied = self.read_context(|ctx| {
            let frames = ctx.map_or(&[][..], |c| c.frames.as_slice());
            copy_frames(frames)
        });
        match copied {
            Ok(frames) => ForkSnapshot { frames },
            Err(e) => {
                tracing::warn!(error = %e, "could not copy identity stack for child; starting empty");
                ForkSnapshot::default()
            }
        }
    }

    /// Install a parent's snapshot as the calling thread's identity stack.
    /// Shared storage has a single slot and is left as is.
    pub fn adopt(&self, snapshot: ForkSnapshot) {
        if !self.mode.is_isolated() {
            return;
        }
        self.with_context(|ctx| ctx.frames = snapshot.frames);
    }

    /// Drop the calling thread's context when it is done (isolated modes only).
    pub fn detach(&self) {
        if let Storage::Isolated(map) = &self.storage {
            map.remove(&thread::current().id());
        }
    }

    /// Spawn a thread that starts with this context's inheritable identity.
    pub fn spawn<F, T>(self: &Arc<Self>, f: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let snapshot = self.fork();
        let store = Arc::clone(self);
        thread::spawn(move || {
            store.adopt(snapshot);
            let out = f();
            store.detach();
            out
        })
    }
}

fn copy_frames(frames: &[IdentityFrame]) -> Result<Vec<IdentityFrame>> {
    let mut copy = Vec::new();
    copy.try_reserve_exact(frames.len())
        .map_err(|e| CallerIdError::Other(format!("identity stack copy failed: {}", e)))?;
    copy.extend(frames.iter().cloned());
    Ok(copy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_compose_into_one_frame() {
        let store = AssociationStore::new(AssociationMode::Isolated);
        store.set_principal(Some(Principal::new("jduke")));
        store.set_credential(Some(Credential::from("theduke")));
        store.set_subject(Some(Subject::new()));
        assert_eq!(store.depth(), 1);
    }

    #[test]
    fn second_write_layers_a_new_frame() {
        let store = AssociationStore::new(AssociationMode::Isolated);
        store.set_principal(Some(Principal::new("a")));
        store.set_credential(Some(Credential::from("pa")));
        store.set_principal(Some(Principal::new("b")));
        assert_eq!(store.depth(), 2);
        // The layered frame still sees the credential set beneath it.
        assert!(store.credential().is_some());

        store.set_credential(Some(Credential::from("pb")));
        assert_eq!(store.depth(), 2);

        store.pop().unwrap();
        assert_eq!(store.principal(), Some(Principal::new("a")));
        assert!(store.credential().unwrap().matches(&Credential::from("pa")));
    }

    #[test]
    fn pop_on_empty_is_invalid_usage() {
        let store = AssociationStore::new(AssociationMode::Shared);
        let err = store.pop().unwrap_err();
        assert!(err.is_invalid_usage());
        assert_eq!(store.depth(), 0);
    }

    #[test]
    fn duplicate_without_frame_is_noop() {
        let store = AssociationStore::new(AssociationMode::Isolated);
        assert!(!store.duplicate());
        assert_eq!(store.depth(), 0);
        store.push(None, Some(Principal::new("a")), None);
        assert!(store.duplicate());
        assert_eq!(store.depth(), 2);
    }

    #[test]
    fn run_as_look_back() {
        let store = AssociationStore::new(AssociationMode::Isolated);
        assert_eq!(store.peek_run_as(0).unwrap(), None);
        store.push_run_as(RunAsIdentity::new("Internal", "svc1"));
        store.push_run_as(RunAsIdentity::new("Batch", "svc2"));
        assert_eq!(store.peek_run_as(0).unwrap().unwrap().principal_name(), "svc2");
        assert_eq!(store.peek_run_as(1).unwrap().unwrap().principal_name(), "svc1");
        assert!(matches!(
            store.peek_run_as(2),
            Err(CallerIdError::RunAsDepth(2))
        ));
        assert_eq!(store.run_as_depth(), 2);
    }

    #[test]
    fn clear_drops_the_thread_context() {
        let store = AssociationStore::new(AssociationMode::Isolated);
        store.push(None, Some(Principal::new("a")), None);
        assert_eq!(store.active_contexts(), 1);
        store.clear();
        assert_eq!(store.active_contexts(), 0);
        assert_eq!(store.principal(), None);
    }

    #[test]
    fn balanced_pop_drops_the_thread_context() {
        let store = AssociationStore::new(AssociationMode::Isolated);
        store.push(None, Some(Principal::new("a")), None);
        store.push_run_as(RunAsIdentity::new("Role", "svc"));
        store.pop().unwrap();
        assert_eq!(store.active_contexts(), 1);
        store.pop_run_as().unwrap();
        assert_eq!(store.active_contexts(), 0);
    }

    #[test]
    fn failure_side_channel() {
        let store = AssociationStore::new(AssociationMode::Isolated);
        store.record_auth_failure(AuthFailure::new(Some("a"), "bad password"));
        assert_eq!(store.last_auth_failure().unwrap().reason, "bad password");
        assert!(store.take_auth_failure().is_some());
        assert!(store.last_auth_failure().is_none());
    }
}
