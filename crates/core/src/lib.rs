//! Ephemeral port-forward acquisition and downstream synchronisation.
//!
//! A run logs into the VPN provider's web portal (replaying stored cookies,
//! logging in with credentials, or going through a challenge-solving
//! service first), asks the ephemeral port-forwarding panel for a fresh
//! port, and propagates the port to the local configuration store, the
//! torrent client and the compose-managed containers.
//!
//! # Components
//!
//! * [`session::SessionAcquirer`] establishes an authenticated [`session::Session`]
//! * [`negotiate::PortNegotiator`] drives the panel and yields a [`negotiate::PortCandidate`]
//! * [`sync::DownstreamSynchronizer`] applies the port and returns a [`sync::SyncReport`]
//! * [`Orchestrator`] sequences them and owns the browser
//!
//! Every external dependency sits behind a trait so that the `fake` module
//! (enabled by the `test-support` feature) can stand in for it in tests.

pub mod browser;
pub mod config;
pub mod diagnostics;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod lock;
pub mod negotiate;
pub mod orchestrator;
pub mod pacing;
pub mod session;
pub mod sync;

pub use config::{Config, LoginMethod};
pub use error::{EpfError, Result};
pub use orchestrator::{BrowserLease, Orchestrator, RunDeps, RunFailure, RunOutcome};
