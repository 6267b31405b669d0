//! Broker-facing protocol: topic names, discovery descriptors and payloads
//!
//! Everything in here is pure; publishing happens in [`crate::bridge`].

pub mod discovery;
pub mod payloads;
pub mod topics;

pub use discovery::*;
pub use payloads::*;
pub use topics::*;
