//! Propagation of "who is the caller" across a unit of work.
//!
//! Each execution context owns a stack of [`IdentityFrame`]s plus an
//! independent stack of [`RunAsIdentity`] overrides. Whether contexts are
//! per thread or process-wide is decided by the [`AssociationMode`] the store
//! is built with.

pub mod frame;
pub mod guard;
pub mod run_as;
pub mod store;

use once_cell::sync::OnceCell;

use crate::error::{CallerIdError, Result};
use crate::types::*;

pub use frame::{IdentityFrame, SetFlags};
pub use guard::{FrameGuard, RunAsGuard};
pub use run_as::RunAsIdentity;
pub use store::{AssociationMode, AssociationStore, ForkSnapshot};

static GLOBAL: OnceCell<Arc<AssociationStore>> = OnceCell::new();

/// Install the process-wide store in `mode`.
///
/// Succeeds again for the same mode; asking for a different mode once a
/// store exists is an error.
pub fn install(mode: AssociationMode) -> Result<Arc<AssociationStore>> {
    let store = GLOBAL.get_or_init(|| {
        tracing::info!(%mode, "installing process-wide association store");
        Arc::new(AssociationStore::new(mode))
    });
    if store.mode() != mode {
        return Err(CallerIdError::ModeAlreadyInstalled {
            installed: store.mode().to_string(),
            requested: mode.to_string(),
        });
    }
    Ok(Arc::clone(store))
}

/// The process-wide store, installed with the default mode on first use.
pub fn global() -> Arc<AssociationStore> {
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(AssociationStore::new(AssociationMode::default()))))
}

/// The installed mode, if a process-wide store exists yet.
pub fn installed_mode() -> Option<AssociationMode> {
    GLOBAL.get().map(|s| s.mode())
}
