//! Language adapters.
//!
//! The sandbox stays language-agnostic. Adapters define the compile and run
//! argv for a build directory.

pub mod adapter;
pub mod languages;
pub mod registry;

pub use adapter::{merge_flags, ToolchainAdapter};
