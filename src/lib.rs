//! mediamill - file conversion with bounded concurrency and size-targeted
//! compression.
//!
//! The heavy lifting lives in the `mm-*` crates; this crate wires them into
//! a [`service::ConversionService`] and the `mediamill` binary.

pub mod service;

pub use service::{BatchEntry, ConversionRequest, ConversionResult, ConversionService};
