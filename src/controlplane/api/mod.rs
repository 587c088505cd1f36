//! API Module
//!
//! Read-only REST API over the readiness board.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
