//! Order lifecycle: creation with stock reservation, status transitions,
//! cancellation with stock restoration.

use chrono::{Datelike, Utc};
use common::{AppError, AppResult, CustomerId, ErrorCode, Money, OrderId, Page, PageRequest};
use serde::{Deserialize, Serialize};
use store::{
    NewCustomer, NewOrder, Order, OrderChanges, OrderDetails, OrderFilter, OrderStats, OrderStatus,
    Store,
};

use crate::customer::CustomerService;
use crate::order_item::{OrderItemService, OrderLineInput};
use crate::pricing::OrderTotals;

/// Input for creating an order.
///
/// The customer is either an existing `customer_id` or `customer` data; an
/// existing non-deleted customer with the same email is reused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOrder {
    pub customer_id: Option<CustomerId>,
    pub customer: Option<NewCustomer>,
    pub items: Vec<OrderLineInput>,
    pub shipping_cost: Option<Money>,
    pub discount: Option<Money>,
    pub notes: Option<String>,
    pub customer_notes: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
}

pub(crate) fn order_not_found(id: OrderId) -> AppError {
    AppError::service(ErrorCode::OrderNotFound, format!("order {id} not found"))
}

fn invalid_transition(order: &Order, next: OrderStatus) -> AppError {
    AppError::service(
        ErrorCode::OrderInvalidStatusTransition,
        format!(
            "order {} cannot move from {} to {next}",
            order.order_number, order.status
        ),
    )
}

fn non_negative(amount: Money, field: &str) -> AppResult<Money> {
    if amount.is_negative() {
        return Err(AppError::service(
            ErrorCode::ValidationInvalidInput,
            format!("{field} must not be negative"),
        ));
    }
    Ok(amount)
}

/// Service for the order lifecycle.
#[derive(Clone)]
pub struct OrderService<S> {
    store: S,
    customers: CustomerService<S>,
    items: OrderItemService<S>,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            customers: CustomerService::new(store.clone()),
            items: OrderItemService::new(store.clone()),
            store,
        }
    }

    /// Creates an order, its items and the matching stock reservations.
    ///
    /// Every line is checked before anything is written; the order, its items
    /// and the stock decrements are then persisted in one transaction.
    ///
    /// # Errors
    ///
    /// - `VALIDATION_REQUIRED_FIELD` when there are no items or no customer.
    /// - `PRODUCT_NOT_FOUND`, `PRODUCT_INACTIVE` or
    ///   `PRODUCT_INSUFFICIENT_INVENTORY` for the first offending line; the
    ///   message lists all of them.
    /// - `CUSTOMER_NOT_FOUND` for an unknown `customer_id`.
    /// - `VALIDATION_INVALID_INPUT` when the discount exceeds the order amount
    ///   or an amount does not fit in 64-bit cents.
    #[tracing::instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn create(&self, input: CreateOrder) -> AppResult<OrderDetails> {
        if input.items.is_empty() {
            return Err(AppError::service(
                ErrorCode::ValidationRequiredField,
                "an order needs at least one item",
            ));
        }
        let shipping_cost = non_negative(input.shipping_cost.unwrap_or_default(), "shipping cost")?;
        let discount = non_negative(input.discount.unwrap_or_default(), "discount")?;

        let lines = self.items.validate_lines(&input.items).await?;
        let totals = OrderTotals::compute(lines.iter().map(|l| l.total), shipping_cost, discount)?;
        if totals.total_amount.is_negative() {
            return Err(AppError::service(
                ErrorCode::ValidationInvalidInput,
                format!("discount {discount} exceeds the order amount"),
            ));
        }

        let customer = match (input.customer_id, input.customer) {
            (Some(id), _) => self.customers.get_by_id(id).await?,
            (None, Some(data)) => self.customers.find_or_create(data).await?,
            (None, None) => {
                return Err(AppError::service(
                    ErrorCode::ValidationRequiredField,
                    "either customer_id or customer data is required",
                ));
            }
        };

        let details = self
            .store
            .insert_order(NewOrder {
                customer_id: customer.id,
                year: Utc::now().year(),
                subtotal: totals.subtotal,
                tax_amount: totals.tax_amount,
                shipping_cost: totals.shipping_cost,
                discount: totals.discount,
                total_amount: totals.total_amount,
                notes: input.notes,
                customer_notes: input.customer_notes,
                shipping_address: input.shipping_address,
                billing_address: input.billing_address,
                lines,
            })
            .await
            .inspect_err(|e| {
                if e.is(ErrorCode::ProductInsufficientInventory) {
                    metrics::counter!("stock_reservation_failures_total").increment(1);
                }
            })?;

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_total_amount_cents").record(totals.total_amount.cents() as f64);
        tracing::info!(
            order_id = %details.order.id,
            order_number = %details.order.order_number,
            total = %details.order.total_amount,
            "order created"
        );
        Ok(details)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, id: OrderId) -> AppResult<OrderDetails> {
        self.store
            .get_order(id)
            .await?
            .ok_or_else(|| order_not_found(id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_order_number(&self, order_number: &str) -> AppResult<OrderDetails> {
        self.store
            .get_order_by_number(order_number.trim())
            .await?
            .ok_or_else(|| {
                AppError::service(
                    ErrorCode::OrderNotFound,
                    format!("order {order_number} not found"),
                )
            })
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_all(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> AppResult<Page<OrderDetails>> {
        self.store.list_orders(filter, page).await
    }

    pub async fn get_pending(&self, page: PageRequest) -> AppResult<Page<OrderDetails>> {
        let filter = OrderFilter {
            status: Some(OrderStatus::Pending),
            ..Default::default()
        };
        self.get_all(&filter, page).await
    }

    pub async fn get_by_customer_id(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> AppResult<Page<OrderDetails>> {
        self.customers.get_by_id(customer_id).await?;
        let filter = OrderFilter {
            customer_id: Some(customer_id),
            ..Default::default()
        };
        self.get_all(&filter, page).await
    }

    /// Edits notes, addresses, tracking number and delivery date.
    #[tracing::instrument(skip(self, changes))]
    pub async fn update(&self, id: OrderId, changes: OrderChanges) -> AppResult<OrderDetails> {
        let current = self.get_by_id(id).await?;
        if current.order.status == OrderStatus::Cancelled {
            return Err(AppError::service(
                ErrorCode::OrderCannotModify,
                format!("order {} is cancelled", current.order.order_number),
            ));
        }
        if changes.is_empty() {
            return Ok(current);
        }

        self.store
            .update_order(id, changes)
            .await?
            .ok_or_else(|| order_not_found(id))?;
        self.get_by_id(id).await
    }

    /// Moves the order to `status` following the transition table.
    ///
    /// Cancelling through this path goes through [`OrderService::cancel`] so
    /// stock is always restored.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        reason: Option<String>,
    ) -> AppResult<Order> {
        if status == OrderStatus::Cancelled {
            return self.cancel(id, reason).await;
        }

        let current = self.get_by_id(id).await?.order;
        if !current.status.can_transition_to(status) {
            tracing::warn!(order_id = %id, from = %current.status, to = %status, "status transition rejected");
            return Err(invalid_transition(&current, status));
        }

        let order = self
            .store
            .set_order_status(id, current.status, status)
            .await
            .inspect_err(|e| {
                if e.is(ErrorCode::OrderInvalidStatusTransition) {
                    tracing::warn!(order_id = %id, from = %current.status, to = %status, "order changed concurrently");
                }
            })?
            .ok_or_else(|| order_not_found(id))?;

        metrics::counter!("order_status_transitions_total", "to" => status.as_str()).increment(1);
        tracing::info!(order_id = %id, from = %current.status, to = %status, "order status changed");
        Ok(order)
    }

    /// Cancels the order and returns its items' quantities to stock.
    ///
    /// # Errors
    ///
    /// `ORDER_ALREADY_CANCELLED` when the order is already cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: OrderId, reason: Option<String>) -> AppResult<Order> {
        let current = self.get_by_id(id).await?.order;
        if current.status == OrderStatus::Cancelled {
            return Err(AppError::service(
                ErrorCode::OrderAlreadyCancelled,
                format!("order {} is already cancelled", current.order_number),
            ));
        }
        if !current.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(invalid_transition(&current, OrderStatus::Cancelled));
        }

        let order = self
            .store
            .cancel_order(id, reason)
            .await?
            .ok_or_else(|| order_not_found(id))?;

        metrics::counter!("orders_cancelled_total").increment(1);
        metrics::counter!("order_status_transitions_total", "to" => OrderStatus::Cancelled.as_str())
            .increment(1);
        tracing::info!(order_id = %id, from = %current.status, "order cancelled, stock restored");
        Ok(order)
    }

    /// Soft-deletes a pending or cancelled order.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: OrderId) -> AppResult<()> {
        let current = self.get_by_id(id).await?.order;
        if !current.status.can_delete() {
            return Err(AppError::service(
                ErrorCode::ValidationInvalidInput,
                format!(
                    "order {} is {} and can only be deleted when pending or cancelled",
                    current.order_number, current.status
                ),
            ));
        }

        if !self.store.soft_delete_order(id).await? {
            return Err(order_not_found(id));
        }
        tracing::info!(order_id = %id, "order deleted");
        Ok(())
    }

    pub async fn get_stats(&self) -> AppResult<OrderStats> {
        self.store.order_stats().await
    }
}
