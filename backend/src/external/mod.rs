//! External collaborators consumed through narrow interfaces

pub mod catalog;
pub mod events;
pub mod payment;

pub use catalog::CatalogClient;
pub use events::{DomainEvent, PgEventSink};
pub use payment::PaymentClient;
