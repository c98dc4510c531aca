//! # cuebank-core
//!
//! Core types, content definitions, and error handling for the cuebank
//! audio runtime.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
