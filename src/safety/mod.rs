//! Scratch space and artifact storage
//!
//! Run-scoped workspaces and the content-addressed binary store.

pub mod binary_store;
pub mod workspace;
