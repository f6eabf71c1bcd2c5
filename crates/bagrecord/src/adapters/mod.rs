// Rust guideline compliant 2026-02-16

//! Concrete adapters for the hexagonal ports defined in `domain`.
//!
//! Nothing in the recording core depends on these modules; they exist so the
//! pipeline is runnable and testable end to end without a second crate's
//! worth of binary-format or transport engineering.

pub mod demo_source;
pub mod framed_bag;
