//! Shared types and models for the commerce transaction core
//!
//! This crate contains the pure domain layer shared between the backend and
//! other components of the system: aggregate models, common types, and the
//! side-effect-free pricing/availability arithmetic.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
