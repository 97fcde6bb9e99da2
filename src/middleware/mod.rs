//! Middleware module
//!
//! Bearer authentication for protected routes and the global CORS layer.

pub mod auth;
pub mod cors;
