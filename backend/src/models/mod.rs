//! Database models for the commerce transaction core
//!
//! Re-exports models from the shared crate; backend services keep their own
//! private row structs for sqlx mapping.

pub use shared::models::*;
