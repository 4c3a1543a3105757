//! Wire and file formats for epf.
//!
//! This crate holds the serde-serializable shapes epf exchanges with the
//! outside world: the persisted cookie jar, the challenge-solver service
//! request/response bodies, the torrent client preference names, and the
//! line-oriented `KEY=VALUE` document used by the configuration store.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: no I/O, no network, no clocks
//! * 1:1 with the format: field names match what is on disk or on the wire
//! * Stable: changes only when an external format changes
//!
//! Behaviour built on top of these types lives in `epf-rs`.

pub mod cookie;
pub mod env_file;
pub mod preferences;
pub mod solver;

pub use cookie::*;
pub use env_file::*;
pub use preferences::*;
pub use solver::*;
