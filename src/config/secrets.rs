//! Secret handling utilities.
//!
//! Re-exports secrecy types used for credentials in autocrawl.

pub use secrecy::{ExposeSecret, SecretString};
