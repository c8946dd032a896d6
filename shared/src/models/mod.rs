//! Domain models for the commerce transaction core

mod cart;
mod coupon;
mod order;
mod stock;

pub use cart::*;
pub use coupon::*;
pub use order::*;
pub use stock::*;
