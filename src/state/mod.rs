/// State management module
///
/// This module handles everything that outlives one request:
/// - Shared data structures (data.rs)
/// - The SQLite image catalog (library.rs)

pub mod data;
pub mod library;
