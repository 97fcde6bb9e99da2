//! Token counting module
//!
//! Provides token counting functionality using tiktoken-rs.

pub mod counter;

pub use counter::TokenCounter;
