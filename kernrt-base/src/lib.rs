//! Common utilities used by other kernrt crates.
//!
//! This is an internal crate for small pieces that several crates need but
//! which don't have a more dedicated home.

pub mod env;
pub mod iter;
