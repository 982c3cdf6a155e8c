//! Warranty and post-sale incident management for construction companies.
//!
//! Homeowners file claims, technicians are assigned and scheduled, and
//! supervisors follow KPIs and approve debris removal. The crate keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state machines, identity
//!   resolution, scheduling, KPIs, invariants). No I/O.
//! - **[`io`]**: Side effects (config and store files, scaffolding, mail delivery).
//!
//! [`actions`] orchestrate core logic over a [`model::Store`]; [`auth`] and
//! [`notifications`] sit next to them. Both the CLI and the HTTP server call
//! into these modules.

pub mod actions;
pub mod auth;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod model;
pub mod notifications;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
