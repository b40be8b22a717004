//! Shared building blocks for the order-management workspace.
//!
//! - Typed identifiers for products, customers, orders and order items
//! - [`Money`] fixed-point amounts in minor units
//! - Pagination request/response types
//! - The error taxonomy ([`AppError`], [`ErrorCode`]) and the [`AppResult`] outcome alias

pub mod error;
pub mod ids;
pub mod money;
pub mod pagination;

pub use error::{AppError, AppResult, ErrorCode, Layer, TransportStatus};
pub use ids::{CustomerId, OrderId, OrderItemId, ProductId};
pub use money::Money;
pub use pagination::{MAX_PAGE_LIMIT, Page, PageRequest, PaginationMeta};
