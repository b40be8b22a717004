//! Line validation, line pricing and standalone item creation.

use std::collections::HashMap;

use common::{
    AppError, AppResult, ErrorCode, Money, OrderId, OrderItemId, Page, PageRequest, ProductId,
};
use serde::{Deserialize, Serialize};
use store::{
    NewOrderItem, NewOrderLine, OrderItem, OrderItemFilter, OrderStatus, Product, Store,
};

use crate::pricing::line_total;
use crate::product::{
    ensure_active, insufficient_inventory, product_not_found, validate_price,
    validate_requested_quantity,
};

/// One requested line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineInput {
    pub product_id: ProductId,
    pub quantity: i32,
    /// Overrides the product's current price when set.
    #[serde(default)]
    pub unit_price: Option<Money>,
    #[serde(default)]
    pub discount: Option<Money>,
}

/// Input for appending an item to an existing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderItem {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub line: OrderLineInput,
}

/// Checks every line against the catalogue and prices it.
///
/// All violations are collected before failing. The returned error carries the
/// code of the first violation and a message listing all of them.
pub(crate) fn price_lines(
    lines: &[OrderLineInput],
    products: &HashMap<ProductId, Product>,
) -> AppResult<Vec<NewOrderLine>> {
    // Summed in i64 so lines of one product cannot overflow the tally.
    let mut requested: HashMap<ProductId, i64> = HashMap::new();
    for line in lines {
        *requested.entry(line.product_id).or_default() += i64::from(line.quantity.max(0));
    }

    let mut violations: Vec<AppError> = Vec::new();
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let total_requested = requested.get(&line.product_id).copied().unwrap_or_default();
        match price_line(line, products.get(&line.product_id), total_requested) {
            Ok(line) => priced.push(line),
            Err(e) => violations.push(e),
        }
    }

    match violations.first() {
        None => Ok(priced),
        Some(first) => {
            let message = violations
                .iter()
                .map(AppError::message)
                .collect::<Vec<_>>()
                .join("; ");
            tracing::warn!(violations = violations.len(), "order lines rejected");
            Err(AppError::service(first.code(), message))
        }
    }
}

fn price_line(
    line: &OrderLineInput,
    product: Option<&Product>,
    total_requested: i64,
) -> AppResult<NewOrderLine> {
    validate_requested_quantity(line.quantity)?;
    let product = product.ok_or_else(|| product_not_found(line.product_id))?;
    ensure_active(product)?;
    if i64::from(product.quantity) < total_requested {
        return Err(insufficient_inventory(product, total_requested));
    }

    let unit_price = line.unit_price.unwrap_or(product.price);
    validate_price(unit_price)?;
    let discount = line.discount.unwrap_or_default();
    if discount.is_negative() {
        return Err(AppError::service(
            ErrorCode::ValidationInvalidInput,
            format!("discount for product {} must not be negative", product.id),
        ));
    }

    Ok(NewOrderLine {
        product_id: product.id,
        quantity: line.quantity,
        unit_price,
        discount,
        total: line_total(unit_price, line.quantity, discount)?,
    })
}

/// Service for order line items.
#[derive(Clone)]
pub struct OrderItemService<S> {
    store: S,
}

impl<S: Store> OrderItemService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, id: OrderItemId) -> AppResult<OrderItem> {
        self.store.get_order_item(id).await?.ok_or_else(|| {
            AppError::service(
                ErrorCode::OrderNotFound,
                format!("order item {id} not found"),
            )
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_all(
        &self,
        filter: &OrderItemFilter,
        page: PageRequest,
    ) -> AppResult<Page<OrderItem>> {
        self.store.list_order_items(filter, page).await
    }

    /// Validates and prices `lines` against the current catalogue.
    pub async fn validate_lines(&self, lines: &[OrderLineInput]) -> AppResult<Vec<NewOrderLine>> {
        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let products = self
            .store
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        price_lines(lines, &products)
    }

    /// Appends an item to a pending order and reserves its stock.
    ///
    /// Order totals are not recomputed.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, input: CreateOrderItem) -> AppResult<OrderItem> {
        let details = self
            .store
            .get_order(input.order_id)
            .await?
            .ok_or_else(|| crate::order::order_not_found(input.order_id))?;
        if details.order.status != OrderStatus::Pending {
            return Err(AppError::service(
                ErrorCode::OrderCannotModify,
                format!(
                    "items can only be added to pending orders, order {} is {}",
                    details.order.order_number, details.order.status
                ),
            ));
        }

        let mut lines = self.validate_lines(std::slice::from_ref(&input.line)).await?;
        let Some(line) = lines.pop() else {
            return Err(AppError::service(
                ErrorCode::SystemInternalError,
                "validated line missing",
            ));
        };

        let item = self
            .store
            .insert_order_item(NewOrderItem {
                order_id: input.order_id,
                line,
            })
            .await
            .inspect_err(|e| {
                if e.is(ErrorCode::ProductInsufficientInventory) {
                    metrics::counter!("stock_reservation_failures_total").increment(1);
                }
            })?;

        tracing::info!(order_id = %input.order_id, item_id = %item.id, "order item added");
        Ok(item)
    }
}
