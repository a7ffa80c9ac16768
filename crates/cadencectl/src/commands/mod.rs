//! Command implementations.

pub mod depth;
pub mod push;
