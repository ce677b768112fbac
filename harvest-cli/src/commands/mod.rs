//! CLI command implementations.

pub mod acquire;
pub mod hash;
pub mod platforms;
