//! Business logic services for the commerce transaction core

pub mod availability;
pub mod cart;
pub mod coupon;
pub mod order;
pub mod stock;

pub use availability::AvailabilityService;
pub use cart::CartService;
pub use coupon::CouponService;
pub use order::OrderService;
pub use stock::StockLedgerService;
