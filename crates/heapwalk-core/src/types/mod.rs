//! # Types
//!
//! Small value types shared across the crate: snapshot addresses and the flat
//! index space that ties crawler output to the materialized graph.

pub mod address;
pub mod layout;

// Re-export all public types
pub use address::Address;
pub use layout::{Connection, IndexLayout, NodeIndex, NodeSlot};
