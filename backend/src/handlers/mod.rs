//! HTTP handlers for the commerce transaction core

pub mod cart;
pub mod health;
pub mod order;
pub mod stock;

pub use cart::*;
pub use health::*;
pub use order::*;
pub use stock::*;
