//! Repository traits.
//!
//! Every method returns an [`AppResult`]; driver failures are already
//! converted into `DATABASE_*` errors. Lookups return `Ok(None)` when the row is
//! absent or soft-deleted and leave the not-found decision to the caller.

use async_trait::async_trait;
use common::{
    AppResult, CustomerId, OrderId, OrderItemId, Page, PageRequest, ProductId,
};

use crate::models::{
    Customer, CustomerChanges, CustomerFilter, NewCustomer, NewOrder, NewOrderItem, NewProduct,
    Order, OrderChanges, OrderDetails, OrderFilter, OrderItem, OrderItemFilter, OrderStats,
    OrderStatus, Product, ProductChanges, ProductFilter, ProductStats,
};

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Fetches a non-deleted product.
    async fn get_product(&self, id: ProductId) -> AppResult<Option<Product>>;

    /// Fetches the non-deleted products among `ids`, in no particular order.
    async fn get_products(&self, ids: &[ProductId]) -> AppResult<Vec<Product>>;

    /// Fetches a product by SKU, including soft-deleted ones (the SKU stays taken).
    async fn get_product_by_sku(&self, sku: &str) -> AppResult<Option<Product>>;

    /// Lists products ordered by name, then most recent first.
    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> AppResult<Page<Product>>;

    /// Inserts an active product.
    async fn insert_product(&self, product: NewProduct) -> AppResult<Product>;

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> AppResult<Option<Product>>;

    /// Sets the available quantity to an absolute value.
    async fn set_product_stock(&self, id: ProductId, quantity: i32) -> AppResult<Option<Product>>;

    /// Atomically decrements the available quantity if the product is active and
    /// has at least `quantity` units. Returns `None` when the guard fails.
    async fn reserve_stock(&self, id: ProductId, quantity: i32) -> AppResult<Option<Product>>;

    /// Atomically increments the available quantity.
    async fn restore_stock(&self, id: ProductId, quantity: i32) -> AppResult<Option<Product>>;

    async fn set_product_active(&self, id: ProductId, active: bool)
    -> AppResult<Option<Product>>;

    /// Marks the product deleted and inactive. Returns false if it was not found.
    async fn soft_delete_product(&self, id: ProductId) -> AppResult<bool>;

    async fn product_stats(&self, low_stock_threshold: i32) -> AppResult<ProductStats>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Fetches a non-deleted customer.
    async fn get_customer(&self, id: CustomerId) -> AppResult<Option<Customer>>;

    /// Fetches the non-deleted customer with this email (case-insensitive).
    async fn get_customer_by_email(&self, email: &str) -> AppResult<Option<Customer>>;

    /// Lists customers ordered by name.
    async fn list_customers(
        &self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> AppResult<Page<Customer>>;

    async fn insert_customer(&self, customer: NewCustomer) -> AppResult<Customer>;

    async fn update_customer(
        &self,
        id: CustomerId,
        changes: CustomerChanges,
    ) -> AppResult<Option<Customer>>;

    /// Marks the customer deleted and inactive. Returns false if it was not found.
    async fn soft_delete_customer(&self, id: CustomerId) -> AppResult<bool>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Creates an order in one transaction: allocates the next order number for
    /// the year, inserts the order and its items, and reserves stock for every
    /// line. Fails with `PRODUCT_INSUFFICIENT_INVENTORY` and persists nothing if
    /// any reservation guard fails.
    async fn insert_order(&self, order: NewOrder) -> AppResult<OrderDetails>;

    /// Fetches a non-deleted order with its customer and items. Deleted
    /// customers and products are still resolved for historical orders.
    async fn get_order(&self, id: OrderId) -> AppResult<Option<OrderDetails>>;

    async fn get_order_by_number(&self, order_number: &str)
    -> AppResult<Option<OrderDetails>>;

    /// Lists orders, newest first.
    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> AppResult<Page<OrderDetails>>;

    async fn update_order(&self, id: OrderId, changes: OrderChanges)
    -> AppResult<Option<Order>>;

    /// Moves the order from `expected` to `status`, stamping `shipped_at` when
    /// entering `Shipped`. The current status is re-read under the write lock;
    /// if it is no longer `expected` nothing is written and the call fails with
    /// `ORDER_INVALID_STATUS_TRANSITION`.
    async fn set_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> AppResult<Option<Order>>;

    /// Cancels an order in one transaction, stamping `cancelled_at` and the
    /// reason and restoring every item's quantity. The status is checked under
    /// the write lock: an already cancelled order fails with
    /// `ORDER_ALREADY_CANCELLED` and is left untouched.
    async fn cancel_order(&self, id: OrderId, reason: Option<String>)
    -> AppResult<Option<Order>>;

    /// Marks the order deleted. Returns false if it was not found.
    async fn soft_delete_order(&self, id: OrderId) -> AppResult<bool>;

    async fn order_stats(&self) -> AppResult<OrderStats>;

    /// Appends an item to an existing order and reserves its stock in one
    /// transaction. Order totals are left untouched. Fails with
    /// `ORDER_CANNOT_MODIFY` unless the order is still pending under the lock.
    async fn insert_order_item(&self, item: NewOrderItem) -> AppResult<OrderItem>;

    async fn get_order_item(&self, id: OrderItemId) -> AppResult<Option<OrderItem>>;

    /// Lists items, oldest first.
    async fn list_order_items(
        &self,
        filter: &OrderItemFilter,
        page: PageRequest,
    ) -> AppResult<Page<OrderItem>>;
}

/// Everything the services need from persistence.
pub trait Store: ProductRepository + CustomerRepository + OrderRepository + Clone + 'static {}

impl<T> Store for T where T: ProductRepository + CustomerRepository + OrderRepository + Clone + 'static
{}
