//! Persisted entities and the inputs/filters repositories accept.

mod customer;
mod order;
mod product;

pub use customer::{Customer, CustomerChanges, CustomerFilter, NewCustomer};
pub use order::{
    NewOrder, NewOrderItem, NewOrderLine, ORDER_NUMBER_PREFIX, Order, OrderChanges, OrderDetails,
    OrderFilter, OrderItem, OrderItemDetails, OrderItemFilter, OrderStats, OrderStatus,
    order_number,
};
pub use product::{
    NewProduct, Product, ProductCategory, ProductChanges, ProductFilter, ProductKind, ProductStats,
};
