//! Pairlink link-layer core.
//!
//! Pure protocol logic shared by server and test drivers: the per-connection
//! link state machine ([`Link`]) and the [`Environment`] abstraction that
//! decouples logic from system time and randomness.
//!
//! Nothing in this crate performs I/O. State machines take time as a
//! parameter and return actions for a driver to execute, which keeps the
//! logic deterministic and directly testable.

#![forbid(unsafe_code)]

pub mod env;
pub mod error;
pub mod link;

pub use env::Environment;
pub use error::LinkError;
pub use link::{Link, LinkAction, LinkConfig, LinkState};
