//! Capability interfaces and their in-memory implementations.
//!
//! Each sub-module defines one seam of the core as a trait plus the shipped
//! service. The coordinator in [`operations`] composes the traits only, so
//! implementations are swappable (production vs. test doubles).

pub mod facilities;
pub mod operations;
pub mod pricing;
pub mod sessions;
pub mod slots;
pub mod vehicles;
