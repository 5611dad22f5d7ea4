//! # PlugRPC
//!
//! The wire vocabulary spoken between an application frame and the supervisor.
//!
//! ## Architecture
//!
//! Messages are JSON objects discriminated by a `type` field drawn from a closed
//! set of literals. Everything in this crate is pure data: it builds messages,
//! recognizes them from untrusted input, and mints correlation ids. Moving bytes
//! and matching replies to requests is left to the runtime.

pub mod error;
pub mod id;
pub mod message;

pub use error::Error;
pub use error::PluginError;
pub use error::Result;
pub use id::CallId;
pub use message::*;

#[cfg(test)]
mod tests;
