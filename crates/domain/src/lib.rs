//! Business rules for the order-management system.
//!
//! This crate provides:
//! - [`ProductService`]: catalogue validation and stock reservation
//! - [`CustomerService`]: required fields and email uniqueness
//! - [`OrderService`]: order creation, status transitions and cancellation
//! - [`OrderItemService`]: line validation and pricing
//!
//! Every service is generic over a [`store::Store`] and returns
//! [`common::AppResult`].

pub mod customer;
pub mod order;
pub mod order_item;
pub mod pricing;
pub mod product;

pub use customer::{CustomerService, normalize_email};
pub use order::{CreateOrder, OrderService};
pub use order_item::{CreateOrderItem, OrderItemService, OrderLineInput};
pub use pricing::{OrderTotals, TAX_RATE_PERCENT, line_total, tax_for};
pub use product::{DEFAULT_LOW_STOCK_THRESHOLD, MAX_PRODUCT_PRICE, ProductService};
