// File: testing-framework/src/utilities/mod.rs
//
// Testing Utilities

/// Temporary node data directories
pub mod storage;

pub use storage::TempDataDir;
