//! # carnet-core
//!
//! Core types, traits, and abstractions for the carnet note service.
//!
//! This crate provides the domain models, the error taxonomy, validation
//! helpers, the HTML image-reference scanner, and the repository trait
//! definitions that the storage crate implements.

pub mod error;
pub mod html;
pub mod models;
pub mod traits;
pub mod validate;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use html::image_sources;
pub use models::*;
pub use traits::*;
pub use validate::{FieldError, ValidationErrors, Validator, MAX_NAME_LEN};
