//! Typed input tree for the emitter.
//!
//! The tree arrives fully resolved: overloads picked, conversions
//! materialized as explicit nodes, local slots assigned. The emitter
//! trusts it.

pub mod nodes;
pub mod types;

pub use nodes::*;
pub use types::*;
