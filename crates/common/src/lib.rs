//! Common types for the kuruvi workspace

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
