use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    AppError, AppResult, CustomerId, ErrorCode, OrderId, OrderItemId, Page, PageRequest,
    ProductId,
};
use tokio::sync::RwLock;

use crate::error::{check_cancellable, check_expected_status, check_pending, out_of_range};
use crate::models::{
    Customer, CustomerChanges, CustomerFilter, NewCustomer, NewOrder, NewOrderItem, NewProduct,
    Order, OrderChanges, OrderDetails, OrderFilter, OrderItem, OrderItemDetails, OrderItemFilter,
    OrderStats, OrderStatus, Product, ProductChanges, ProductFilter, ProductStats, order_number,
};
use crate::repository::{CustomerRepository, OrderRepository, ProductRepository};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    customers: HashMap<CustomerId, Customer>,
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderItemId, OrderItem>,
    sequences: HashMap<i32, i64>,
}

impl Tables {
    fn live_product(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id).filter(|p| !p.is_deleted)
    }

    fn live_product_mut(&mut self, id: ProductId) -> Option<&mut Product> {
        self.products.get_mut(&id).filter(|p| !p.is_deleted)
    }

    fn live_customer_by_email(&self, email: &str) -> Option<&Customer> {
        self.customers
            .values()
            .find(|c| !c.is_deleted && c.email.eq_ignore_ascii_case(email))
    }

    fn sku_taken(&self, sku: &str, except: Option<ProductId>) -> bool {
        self.products
            .values()
            .any(|p| Some(p.id) != except && p.sku.as_deref() == Some(sku))
    }

    /// Checks every reservation guard before mutating anything.
    fn check_reservations(&self, lines: impl IntoIterator<Item = (ProductId, i32)>) -> AppResult<()> {
        let mut requested: HashMap<ProductId, i64> = HashMap::new();
        for (product_id, quantity) in lines {
            *requested.entry(product_id).or_default() += i64::from(quantity);
        }
        for (product_id, quantity) in requested {
            let ok = self
                .live_product(product_id)
                .is_some_and(|p| p.is_active && i64::from(p.quantity) >= quantity);
            if !ok {
                return Err(AppError::repository(
                    ErrorCode::ProductInsufficientInventory,
                    format!("could not reserve {quantity} units of product {product_id}"),
                ));
            }
        }
        Ok(())
    }

    /// Takes stock already cleared by [`Tables::check_reservations`].
    fn take_stock(&mut self, product_id: ProductId, quantity: i32) {
        if let Some(product) = self.products.get_mut(&product_id) {
            product.quantity -= quantity;
            product.updated_at = Utc::now();
        }
    }

    /// Returns quantities to stock. Nothing changes if any product would
    /// overflow.
    fn restock(&mut self, lines: impl IntoIterator<Item = (ProductId, i32)>) -> AppResult<()> {
        let mut updated: HashMap<ProductId, i32> = HashMap::new();
        for (product_id, quantity) in lines {
            let Some(product) = self.products.get(&product_id) else {
                continue;
            };
            let current = updated.get(&product_id).copied().unwrap_or(product.quantity);
            let next = current
                .checked_add(quantity)
                .ok_or_else(|| out_of_range(&format!("stock of product {product_id}")))?;
            updated.insert(product_id, next);
        }

        let now = Utc::now();
        for (product_id, quantity) in updated {
            if let Some(product) = self.products.get_mut(&product_id) {
                product.quantity = quantity;
                product.updated_at = now;
            }
        }
        Ok(())
    }

    fn details(&self, order: &Order) -> Option<OrderDetails> {
        let customer = self.customers.get(&order.customer_id)?.clone();
        let mut items: Vec<OrderItemDetails> = self
            .items
            .values()
            .filter(|i| i.order_id == order.id)
            .filter_map(|item| {
                let product = self.products.get(&item.product_id)?.clone();
                Some(OrderItemDetails {
                    item: item.clone(),
                    product,
                })
            })
            .collect();
        items.sort_by_key(|i| (i.item.created_at, i.item.id));
        Some(OrderDetails {
            order: order.clone(),
            customer,
            items,
        })
    }
}

/// In-memory store implementation for testing and local runs.
///
/// All tables sit behind one lock, so every operation is atomic, including
/// multi-row ones like order creation and cancellation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of order rows, including soft-deleted ones.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the number of customer rows, including soft-deleted ones.
    pub async fn customer_count(&self) -> usize {
        self.tables.read().await.customers.len()
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn get_product(&self, id: ProductId) -> AppResult<Option<Product>> {
        Ok(self.tables.read().await.live_product(id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> AppResult<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .values()
            .filter(|p| !p.is_deleted && ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn get_product_by_sku(&self, sku: &str) -> AppResult<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .values()
            .find(|p| p.sku.as_deref() == Some(sku))
            .cloned())
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> AppResult<Page<Product>> {
        let tables = self.tables.read().await;
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then(b.created_at.cmp(&a.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(Page::from_vec(products, page))
    }

    async fn insert_product(&self, product: NewProduct) -> AppResult<Product> {
        let mut tables = self.tables.write().await;
        if let Some(sku) = product.sku.as_deref()
            && tables.sku_taken(sku, None)
        {
            return Err(AppError::repository(
                ErrorCode::DatabaseConstraintViolation,
                "unique constraint products_sku_key violated",
            ));
        }

        let now = Utc::now();
        let product = Product {
            id: ProductId::new(),
            name: product.name,
            description: product.description,
            price: product.price,
            quantity: product.quantity,
            category: product.category,
            brand: product.brand,
            model: product.model,
            sku: product.sku,
            image_url: product.image_url,
            is_active: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> AppResult<Option<Product>> {
        let mut tables = self.tables.write().await;
        if let Some(sku) = changes.sku.as_deref()
            && tables.sku_taken(sku, Some(id))
        {
            return Err(AppError::repository(
                ErrorCode::DatabaseConstraintViolation,
                "unique constraint products_sku_key violated",
            ));
        }

        let Some(product) = tables.live_product_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            product.name = name;
        }
        if let Some(description) = changes.description {
            product.description = Some(description);
        }
        if let Some(price) = changes.price {
            product.price = price;
        }
        if let Some(quantity) = changes.quantity {
            product.quantity = quantity;
        }
        if let Some(category) = changes.category {
            product.category = category;
        }
        if let Some(brand) = changes.brand {
            product.brand = Some(brand);
        }
        if let Some(model) = changes.model {
            product.model = Some(model);
        }
        if let Some(sku) = changes.sku {
            product.sku = Some(sku);
        }
        if let Some(image_url) = changes.image_url {
            product.image_url = Some(image_url);
        }
        if let Some(is_active) = changes.is_active {
            product.is_active = is_active;
        }
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn set_product_stock(&self, id: ProductId, quantity: i32) -> AppResult<Option<Product>> {
        let mut tables = self.tables.write().await;
        Ok(tables.live_product_mut(id).map(|p| {
            p.quantity = quantity;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn reserve_stock(&self, id: ProductId, quantity: i32) -> AppResult<Option<Product>> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .live_product_mut(id)
            .filter(|p| p.is_active && p.quantity >= quantity)
            .map(|p| {
                p.quantity -= quantity;
                p.updated_at = Utc::now();
                p.clone()
            }))
    }

    async fn restore_stock(&self, id: ProductId, quantity: i32) -> AppResult<Option<Product>> {
        let mut tables = self.tables.write().await;
        let Some(product) = tables.live_product_mut(id) else {
            return Ok(None);
        };
        product.quantity = product
            .quantity
            .checked_add(quantity)
            .ok_or_else(|| out_of_range(&format!("stock of product {id}")))?;
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn set_product_active(
        &self,
        id: ProductId,
        active: bool,
    ) -> AppResult<Option<Product>> {
        let mut tables = self.tables.write().await;
        Ok(tables.live_product_mut(id).map(|p| {
            p.is_active = active;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn soft_delete_product(&self, id: ProductId) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .live_product_mut(id)
            .map(|p| {
                p.is_deleted = true;
                p.is_active = false;
                p.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn product_stats(&self, low_stock_threshold: i32) -> AppResult<ProductStats> {
        let tables = self.tables.read().await;
        let mut stats = ProductStats::default();
        for product in tables.products.values().filter(|p| !p.is_deleted) {
            stats.total += 1;
            if product.is_active {
                stats.active += 1;
            } else {
                stats.inactive += 1;
            }
            if product.quantity <= low_stock_threshold {
                stats.low_stock += 1;
            }
            if product.quantity == 0 {
                stats.out_of_stock += 1;
            }
            stats.total_inventory_value = product
                .inventory_value()
                .and_then(|value| stats.total_inventory_value.checked_add(value))
                .ok_or_else(|| out_of_range("total inventory value"))?;
        }
        Ok(stats)
    }
}

#[async_trait]
impl CustomerRepository for InMemoryStore {
    async fn get_customer(&self, id: CustomerId) -> AppResult<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables.customers.get(&id).filter(|c| !c.is_deleted).cloned())
    }

    async fn get_customer_by_email(&self, email: &str) -> AppResult<Option<Customer>> {
        Ok(self.tables.read().await.live_customer_by_email(email).cloned())
    }

    async fn list_customers(
        &self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> AppResult<Page<Customer>> {
        let tables = self.tables.read().await;
        let mut customers: Vec<Customer> = tables
            .customers
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        customers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(Page::from_vec(customers, page))
    }

    async fn insert_customer(&self, customer: NewCustomer) -> AppResult<Customer> {
        let mut tables = self.tables.write().await;
        if tables.live_customer_by_email(&customer.email).is_some() {
            return Err(AppError::repository(
                ErrorCode::DatabaseConstraintViolation,
                "unique constraint customers_email_key violated",
            ));
        }

        let now = Utc::now();
        let customer = Customer {
            id: CustomerId::new(),
            name: customer.name,
            email: customer.email,
            phone: customer.phone,
            address: customer.address,
            city: customer.city,
            state: customer.state,
            postal_code: customer.postal_code,
            country: customer.country,
            tax_id: customer.tax_id,
            company: customer.company,
            is_active: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        tables.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn update_customer(
        &self,
        id: CustomerId,
        changes: CustomerChanges,
    ) -> AppResult<Option<Customer>> {
        let mut tables = self.tables.write().await;
        if let Some(email) = changes.email.as_deref()
            && tables
                .live_customer_by_email(email)
                .is_some_and(|other| other.id != id)
        {
            return Err(AppError::repository(
                ErrorCode::DatabaseConstraintViolation,
                "unique constraint customers_email_key violated",
            ));
        }

        let Some(customer) = tables.customers.get_mut(&id).filter(|c| !c.is_deleted) else {
            return Ok(None);
        };
        let CustomerChanges {
            name,
            email,
            phone,
            address,
            city,
            state,
            postal_code,
            country,
            tax_id,
            company,
            is_active,
        } = changes;
        if let Some(name) = name {
            customer.name = name;
        }
        if let Some(email) = email {
            customer.email = email;
        }
        for (slot, value) in [
            (&mut customer.phone, phone),
            (&mut customer.address, address),
            (&mut customer.city, city),
            (&mut customer.state, state),
            (&mut customer.postal_code, postal_code),
            (&mut customer.country, country),
            (&mut customer.tax_id, tax_id),
            (&mut customer.company, company),
        ] {
            if value.is_some() {
                *slot = value;
            }
        }
        if let Some(is_active) = is_active {
            customer.is_active = is_active;
        }
        customer.updated_at = Utc::now();
        Ok(Some(customer.clone()))
    }

    async fn soft_delete_customer(&self, id: CustomerId) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .customers
            .get_mut(&id)
            .filter(|c| !c.is_deleted)
            .map(|c| {
                c.is_deleted = true;
                c.is_active = false;
                c.updated_at = Utc::now();
            })
            .is_some())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, new_order: NewOrder) -> AppResult<OrderDetails> {
        let mut tables = self.tables.write().await;

        if !tables.customers.contains_key(&new_order.customer_id) {
            return Err(AppError::repository(
                ErrorCode::DatabaseConstraintViolation,
                "order references a missing customer",
            ));
        }
        tables.check_reservations(new_order.lines.iter().map(|l| (l.product_id, l.quantity)))?;

        let sequence = {
            let next = tables.sequences.entry(new_order.year).or_insert(0);
            *next += 1;
            *next
        };

        let now = Utc::now();
        let order = Order {
            id: OrderId::new(),
            order_number: order_number(new_order.year, sequence),
            status: OrderStatus::Pending,
            customer_id: new_order.customer_id,
            subtotal: new_order.subtotal,
            tax_amount: new_order.tax_amount,
            shipping_cost: new_order.shipping_cost,
            discount: new_order.discount,
            total_amount: new_order.total_amount,
            notes: new_order.notes,
            customer_notes: new_order.customer_notes,
            shipping_address: new_order.shipping_address,
            billing_address: new_order.billing_address,
            tracking_number: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancel_reason: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        for line in new_order.lines {
            tables.take_stock(line.product_id, line.quantity);
            let item = OrderItem {
                id: OrderItemId::new(),
                order_id: order.id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount: line.discount,
                total: line.total,
                created_at: now,
                updated_at: now,
            };
            tables.items.insert(item.id, item);
        }
        tables.orders.insert(order.id, order.clone());

        tables.details(&order).ok_or_else(|| {
            AppError::repository(ErrorCode::DatabaseQueryError, "created order vanished")
        })
    }

    async fn get_order(&self, id: OrderId) -> AppResult<Option<OrderDetails>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .get(&id)
            .filter(|o| !o.is_deleted)
            .and_then(|o| tables.details(o)))
    }

    async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> AppResult<Option<OrderDetails>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .find(|o| !o.is_deleted && o.order_number == order_number)
            .and_then(|o| tables.details(o)))
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> AppResult<Page<OrderDetails>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<OrderDetails> = tables
            .orders
            .values()
            .filter(|o| !o.is_deleted)
            .filter_map(|o| tables.details(o))
            .filter(|d| filter.matches(d))
            .collect();
        orders.sort_by(|a, b| {
            b.order
                .created_at
                .cmp(&a.order.created_at)
                .then(b.order.order_number.cmp(&a.order.order_number))
        });
        Ok(Page::from_vec(orders, page))
    }

    async fn update_order(
        &self,
        id: OrderId,
        changes: OrderChanges,
    ) -> AppResult<Option<Order>> {
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get_mut(&id).filter(|o| !o.is_deleted) else {
            return Ok(None);
        };
        for (slot, value) in [
            (&mut order.notes, changes.notes),
            (&mut order.customer_notes, changes.customer_notes),
            (&mut order.shipping_address, changes.shipping_address),
            (&mut order.billing_address, changes.billing_address),
            (&mut order.tracking_number, changes.tracking_number),
        ] {
            if value.is_some() {
                *slot = value;
            }
        }
        if changes.delivered_at.is_some() {
            order.delivered_at = changes.delivered_at;
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn set_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> AppResult<Option<Order>> {
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get_mut(&id).filter(|o| !o.is_deleted) else {
            return Ok(None);
        };
        check_expected_status(id, order.status, expected)?;
        let now = Utc::now();
        order.status = status;
        if status == OrderStatus::Shipped {
            order.shipped_at = Some(now);
        }
        order.updated_at = now;
        Ok(Some(order.clone()))
    }

    async fn cancel_order(
        &self,
        id: OrderId,
        reason: Option<String>,
    ) -> AppResult<Option<Order>> {
        let mut tables = self.tables.write().await;
        let Some(previous) = tables
            .orders
            .get(&id)
            .filter(|o| !o.is_deleted)
            .map(|o| o.status)
        else {
            return Ok(None);
        };
        check_cancellable(id, previous)?;

        let restocks: Vec<(ProductId, i32)> = tables
            .items
            .values()
            .filter(|i| i.order_id == id)
            .map(|i| (i.product_id, i.quantity))
            .collect();
        tables.restock(restocks)?;

        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(None);
        };
        let now = Utc::now();
        order.status = OrderStatus::Cancelled;
        order.cancelled_at = Some(now);
        order.cancel_reason = reason;
        order.updated_at = now;
        Ok(Some(order.clone()))
    }

    async fn soft_delete_order(&self, id: OrderId) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .orders
            .get_mut(&id)
            .filter(|o| !o.is_deleted)
            .map(|o| {
                o.is_deleted = true;
                o.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn order_stats(&self) -> AppResult<OrderStats> {
        let tables = self.tables.read().await;
        let mut stats = OrderStats::default();
        let mut billable = 0_i64;
        for order in tables.orders.values().filter(|o| !o.is_deleted) {
            stats.total += 1;
            match order.status {
                OrderStatus::Pending => stats.pending += 1,
                OrderStatus::Processing => stats.processing += 1,
                OrderStatus::Shipped => stats.shipped += 1,
                OrderStatus::Cancelled => stats.cancelled += 1,
            }
            if order.status != OrderStatus::Cancelled {
                stats.total_revenue = stats
                    .total_revenue
                    .checked_add(order.total_amount)
                    .ok_or_else(|| out_of_range("total revenue"))?;
                billable += 1;
            }
        }
        stats.average_order_value = stats.total_revenue.average_over(billable);
        Ok(stats)
    }

    async fn insert_order_item(&self, new_item: NewOrderItem) -> AppResult<OrderItem> {
        let mut tables = self.tables.write().await;
        let Some(status) = tables
            .orders
            .get(&new_item.order_id)
            .filter(|o| !o.is_deleted)
            .map(|o| o.status)
        else {
            return Err(AppError::repository(
                ErrorCode::DatabaseConstraintViolation,
                "order item references a missing order",
            ));
        };
        check_pending(new_item.order_id, status)?;
        let line = new_item.line;
        tables.check_reservations(std::iter::once((line.product_id, line.quantity)))?;
        tables.take_stock(line.product_id, line.quantity);

        let now = Utc::now();
        let item = OrderItem {
            id: OrderItemId::new(),
            order_id: new_item.order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount: line.discount,
            total: line.total,
            created_at: now,
            updated_at: now,
        };
        tables.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_order_item(&self, id: OrderItemId) -> AppResult<Option<OrderItem>> {
        Ok(self.tables.read().await.items.get(&id).cloned())
    }

    async fn list_order_items(
        &self,
        filter: &OrderItemFilter,
        page: PageRequest,
    ) -> AppResult<Page<OrderItem>> {
        let tables = self.tables.read().await;
        let mut items: Vec<OrderItem> = tables
            .items
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.created_at, i.id));
        Ok(Page::from_vec(items, page))
    }
}

#[cfg(test)]
mod tests {
    use common::Money;

    use super::*;
    use crate::models::{NewOrderLine, ProductCategory, ProductKind};

    fn racket(quantity: i32) -> NewProduct {
        NewProduct {
            name: ProductKind::Racket,
            description: None,
            price: Money::from_units(100),
            quantity,
            category: ProductCategory::Intermediate,
            brand: Some("Babolat".to_string()),
            model: Some("Pure Drive".to_string()),
            sku: None,
            image_url: None,
        }
    }

    fn customer(email: &str) -> NewCustomer {
        NewCustomer {
            name: "Ana".to_string(),
            email: email.to_string(),
            ..Default::default()
        }
    }

    fn order_for(customer_id: CustomerId, product_id: ProductId, quantity: i32) -> NewOrder {
        let price = Money::from_units(100 * i64::from(quantity));
        NewOrder {
            customer_id,
            year: 2026,
            subtotal: price,
            tax_amount: Money::zero(),
            shipping_cost: Money::zero(),
            discount: Money::zero(),
            total_amount: price,
            notes: None,
            customer_notes: None,
            shipping_address: None,
            billing_address: None,
            lines: vec![NewOrderLine {
                product_id,
                quantity,
                unit_price: Money::from_units(100),
                discount: Money::zero(),
                total: price,
            }],
        }
    }

    #[tokio::test]
    async fn reserve_stock_refuses_to_go_negative() {
        let store = InMemoryStore::new();
        let product = store.insert_product(racket(2)).await.unwrap();

        assert!(store.reserve_stock(product.id, 3).await.unwrap().is_none());
        let after = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(after.quantity, 2);

        let reserved = store.reserve_stock(product.id, 2).await.unwrap().unwrap();
        assert_eq!(reserved.quantity, 0);
    }

    #[tokio::test]
    async fn reserve_stock_refuses_inactive_product() {
        let store = InMemoryStore::new();
        let product = store.insert_product(racket(5)).await.unwrap();
        store.set_product_active(product.id, false).await.unwrap();

        assert!(store.reserve_stock(product.id, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_sku_is_a_constraint_violation() {
        let store = InMemoryStore::new();
        let mut input = racket(1);
        input.sku = Some("RK-001".to_string());
        store.insert_product(input.clone()).await.unwrap();

        let err = store.insert_product(input).await.unwrap_err();
        assert!(err.is(ErrorCode::DatabaseConstraintViolation));
    }

    #[tokio::test]
    async fn order_numbers_are_sequential_per_year() {
        let store = InMemoryStore::new();
        let customer = store.insert_customer(customer("a@example.com")).await.unwrap();
        let product = store.insert_product(racket(10)).await.unwrap();

        let first = store
            .insert_order(order_for(customer.id, product.id, 1))
            .await
            .unwrap();
        let second = store
            .insert_order(order_for(customer.id, product.id, 1))
            .await
            .unwrap();
        let mut next_year = order_for(customer.id, product.id, 1);
        next_year.year = 2027;
        let third = store.insert_order(next_year).await.unwrap();

        assert_eq!(first.order.order_number, "ORD-2026-000001");
        assert_eq!(second.order.order_number, "ORD-2026-000002");
        assert_eq!(third.order.order_number, "ORD-2027-000001");
    }

    #[tokio::test]
    async fn failed_reservation_rolls_back_the_whole_order() {
        let store = InMemoryStore::new();
        let customer = store.insert_customer(customer("b@example.com")).await.unwrap();
        let plenty = store.insert_product(racket(10)).await.unwrap();
        let scarce = store.insert_product(racket(1)).await.unwrap();

        let mut order = order_for(customer.id, plenty.id, 2);
        order.lines.push(NewOrderLine {
            product_id: scarce.id,
            quantity: 5,
            unit_price: Money::from_units(100),
            discount: Money::zero(),
            total: Money::from_units(500),
        });

        let err = store.insert_order(order).await.unwrap_err();
        assert!(err.is(ErrorCode::ProductInsufficientInventory));
        assert_eq!(store.order_count().await, 0);
        let plenty = store.get_product(plenty.id).await.unwrap().unwrap();
        assert_eq!(plenty.quantity, 10);
    }

    #[tokio::test]
    async fn repeated_product_lines_are_reserved_together() {
        let store = InMemoryStore::new();
        let customer = store.insert_customer(customer("c@example.com")).await.unwrap();
        let product = store.insert_product(racket(3)).await.unwrap();

        let mut order = order_for(customer.id, product.id, 2);
        order.lines.push(order.lines[0].clone());

        let err = store.insert_order(order).await.unwrap_err();
        assert!(err.is(ErrorCode::ProductInsufficientInventory));
    }

    #[tokio::test]
    async fn cancelling_twice_restores_stock_once() {
        let store = InMemoryStore::new();
        let customer = store.insert_customer(customer("d@example.com")).await.unwrap();
        let product = store.insert_product(racket(5)).await.unwrap();
        let created = store
            .insert_order(order_for(customer.id, product.id, 2))
            .await
            .unwrap();

        let cancelled = store
            .cancel_order(created.order.id, Some("changed mind".to_string()))
            .await
            .unwrap()
            .unwrap();
        let err = store
            .cancel_order(created.order.id, Some("again".to_string()))
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::OrderAlreadyCancelled));

        let order = store.get_order(created.order.id).await.unwrap().unwrap().order;
        assert_eq!(order.cancel_reason.as_deref(), Some("changed mind"));
        assert_eq!(order.cancelled_at, cancelled.cancelled_at);
        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 5);
    }

    #[tokio::test]
    async fn status_write_with_stale_expected_status_is_rejected() {
        let store = InMemoryStore::new();
        let customer = store.insert_customer(customer("g@example.com")).await.unwrap();
        let product = store.insert_product(racket(5)).await.unwrap();
        let created = store
            .insert_order(order_for(customer.id, product.id, 2))
            .await
            .unwrap();

        // Cancelled after the caller last saw it pending.
        store.cancel_order(created.order.id, None).await.unwrap();
        let err = store
            .set_order_status(created.order.id, OrderStatus::Pending, OrderStatus::Processing)
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::OrderInvalidStatusTransition));

        let order = store.get_order(created.order.id).await.unwrap().unwrap().order;
        assert_eq!(order.status, OrderStatus::Cancelled);
        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 5);
    }

    #[tokio::test]
    async fn item_cannot_land_on_cancelled_order() {
        let store = InMemoryStore::new();
        let customer = store.insert_customer(customer("h@example.com")).await.unwrap();
        let product = store.insert_product(racket(5)).await.unwrap();
        let created = store
            .insert_order(order_for(customer.id, product.id, 1))
            .await
            .unwrap();
        store.cancel_order(created.order.id, None).await.unwrap();

        let line = order_for(customer.id, product.id, 2).lines.remove(0);
        let err = store
            .insert_order_item(NewOrderItem {
                order_id: created.order.id,
                line,
            })
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::OrderCannotModify));

        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 5);
    }

    #[tokio::test]
    async fn restore_stock_refuses_to_overflow() {
        let store = InMemoryStore::new();
        let product = store.insert_product(racket(i32::MAX - 1)).await.unwrap();

        let err = store.restore_stock(product.id, 2).await.unwrap_err();
        assert!(err.is(ErrorCode::ValidationInvalidInput));
        let after = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(after.quantity, i32::MAX - 1);
    }

    #[tokio::test]
    async fn cancel_with_overflowing_restock_changes_nothing() {
        let store = InMemoryStore::new();
        let customer = store.insert_customer(customer("i@example.com")).await.unwrap();
        let product = store.insert_product(racket(5)).await.unwrap();
        let created = store
            .insert_order(order_for(customer.id, product.id, 2))
            .await
            .unwrap();
        store.set_product_stock(product.id, i32::MAX).await.unwrap();

        let err = store.cancel_order(created.order.id, None).await.unwrap_err();
        assert!(err.is(ErrorCode::ValidationInvalidInput));

        let order = store.get_order(created.order.id).await.unwrap().unwrap().order;
        assert_eq!(order.status, OrderStatus::Pending);
        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.quantity, i32::MAX);
    }

    #[tokio::test]
    async fn product_stats_reports_inventory_overflow() {
        let store = InMemoryStore::new();
        for _ in 0..5 {
            let mut input = racket(i32::MAX);
            input.price = Money::from_units(10_000_000);
            store.insert_product(input).await.unwrap();
        }

        let err = store.product_stats(10).await.unwrap_err();
        assert!(err.is(ErrorCode::ValidationInvalidInput));
    }

    #[tokio::test]
    async fn email_is_reusable_after_soft_delete() {
        let store = InMemoryStore::new();
        let first = store.insert_customer(customer("e@example.com")).await.unwrap();

        assert!(store.insert_customer(customer("E@example.com")).await.is_err());

        assert!(store.soft_delete_customer(first.id).await.unwrap());
        assert!(store.insert_customer(customer("e@example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn historical_order_resolves_deleted_product() {
        let store = InMemoryStore::new();
        let customer = store.insert_customer(customer("f@example.com")).await.unwrap();
        let product = store.insert_product(racket(5)).await.unwrap();
        let created = store
            .insert_order(order_for(customer.id, product.id, 1))
            .await
            .unwrap();

        store.soft_delete_product(product.id).await.unwrap();

        let order = store.get_order(created.order.id).await.unwrap().unwrap();
        assert_eq!(order.items.len(), 1);
        assert!(order.items[0].product.is_deleted);
    }

    #[tokio::test]
    async fn product_stats_counts() {
        let store = InMemoryStore::new();
        store.insert_product(racket(0)).await.unwrap();
        store.insert_product(racket(5)).await.unwrap();
        let inactive = store.insert_product(racket(50)).await.unwrap();
        store.set_product_active(inactive.id, false).await.unwrap();

        let stats = store.product_stats(10).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.inactive, 1);
        assert_eq!(stats.low_stock, 2);
        assert_eq!(stats.out_of_stock, 1);
        assert_eq!(stats.total_inventory_value, Money::from_units(5_500));
    }
}
