//! Process-level helpers for epf.
//!
//! Recreating compose services and checking whether another run is still
//! alive both involve spawning or probing OS processes; that code lives
//! here so the core crate stays free of platform `cfg` blocks.

pub mod compose;
pub mod process;

pub use compose::{ComposeProgram, ProcessOutput, RuntimeError, recreate_services};
pub use process::pid_is_alive;
