//! Persistence layer for the order-management system.
//!
//! Repository traits describe every query and transaction the services need;
//! [`InMemoryStore`] backs tests and local runs, [`PostgresStore`] backs
//! production. Both implement the umbrella [`Store`] trait.

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repository;

pub use memory::InMemoryStore;
pub use models::*;
pub use postgres::PostgresStore;
pub use repository::{CustomerRepository, OrderRepository, ProductRepository, Store};
