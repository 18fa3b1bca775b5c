//! HTTP request handlers
//!
//! Each submodule contains handlers for a specific API area.

pub mod health;
pub mod threads;

// Re-export all handlers for use in router
pub use health::*;
pub use threads::*;
