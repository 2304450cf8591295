//! Shared types for the pkit workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
