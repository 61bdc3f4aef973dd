//! mm-core: shared error taxonomy and configuration.
//!
//! This crate is the foundational dependency for all other mm-* crates,
//! providing the unified [`Error`] type and the TOML-backed
//! [`config::Config`].

pub mod config;
pub mod error;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
