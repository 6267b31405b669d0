//! Testing utilities and mock implementations
//!
//! Lets the bridge run against recorded fakes instead of a broker and a
//! Wallpaper Engine installation.

pub mod mocks;

pub use mocks::*;
