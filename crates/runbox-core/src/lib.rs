//! Core logic for runbox
//!
//! This crate provides:
//! - Output sanitizing for captured terminal transcripts
//! - The interactive session engine (PTY shell, prompt sync, marker-echo delimiting)
//! - The container lifecycle state machine and the operations the UI invokes

mod error;
mod lifecycle;
mod manager;
mod sanitize;
pub mod session;
mod workspace;

pub use error::*;
pub use lifecycle::*;
pub use manager::*;
pub use sanitize::*;
pub use workspace::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
