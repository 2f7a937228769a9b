//! callerid: caller identity propagation and authentication result caching.
//!
//! A host validates a caller once through an [`manager::AuthenticationManager`]
//! (which caches the authenticated subject per principal), pushes the
//! caller's identity onto the [`association`] store for the unit of work, and
//! lets authorization code ask who the caller is through
//! [`caller::CallerContext`]. The CLI is gated behind the `cli` feature and is
//! private to the binary.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use callerid::api::SecurityDomain;
//! use callerid::config::Config;
//! use callerid::identity::{Credential, Principal};
//! use callerid::manager::StaticAuthenticator;
//!
//! let users = StaticAuthenticator::new().with_user("jduke", "theduke", ["Echo"]);
//! let domain = SecurityDomain::from_config(&Config::default(), Arc::new(users))?;
//!
//! let jduke = Principal::new("jduke");
//! let _frame = domain.login(Some(&jduke), Some(&Credential::from("theduke")))?;
//! assert!(domain.caller().has_role(&["Echo"]));
//! # Ok::<(), callerid::error::CallerIdError>(())
//! ```

pub mod api;
pub mod association;
pub mod cache;
pub mod caller;
pub mod config;
pub mod error;
pub mod identity;
pub mod manager;
pub mod types;
