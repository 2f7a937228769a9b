//! Common imports shared across the crate's modules.

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use std::collections::{BTreeMap, HashMap};
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};
