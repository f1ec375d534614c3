//! Secret handling utilities.
//!
//! Re-exports secrecy types used for the controller password.

pub use secrecy::{ExposeSecret, SecretString};
