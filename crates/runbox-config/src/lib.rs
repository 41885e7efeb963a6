//! Configuration parsing for runbox
//!
//! This crate handles the global configuration file
//! (`~/.config/runbox/config.toml`): which container engine to drive,
//! the session protocol tokens and timeouts, and where user scripts live.

mod error;
mod global;

pub use error::*;
pub use global::*;
