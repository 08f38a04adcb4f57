//! Shared service types.

pub mod error;

pub use error::{Result, TutorugError};
