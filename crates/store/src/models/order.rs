use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, OrderItemId, ProductId};
use serde::{Deserialize, Serialize};

use super::{Customer, Product};

/// Prefix of every generated order number.
pub const ORDER_NUMBER_PREFIX: &str = "ORD";

/// Formats an order number from its year and per-year sequence value,
/// e.g. `ORD-2026-000042`.
pub fn order_number(year: i32, sequence: i64) -> String {
    format!("{ORDER_NUMBER_PREFIX}-{year}-{sequence:06}")
}

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──► Shipped
///    │            │             │
///    └────────────┴─────────────┴──► Cancelled
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default,
)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Cancelled,
    ];

    /// Statuses reachable from this one in a single step.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[OrderStatus::Shipped, OrderStatus::Cancelled],
            OrderStatus::Shipped => &[OrderStatus::Cancelled],
            OrderStatus::Cancelled => &[],
        }
    }

    /// Returns true if the order may move from this status to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if the order may be soft-deleted in this status.
    pub fn can_delete(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A purchase transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub customer_id: CustomerId,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_cost: Money,
    pub discount: Money,
    /// `subtotal + tax_amount + shipping_cost - discount`, fixed at creation.
    pub total_amount: Money,
    pub notes: Option<String>,
    pub customer_notes: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub tracking_number: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item. Its unit price is captured when the item is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Money,
    pub discount: Money,
    /// `unit_price × quantity - discount`, floored at zero.
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item together with the product it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemDetails {
    #[serde(flatten)]
    pub item: OrderItem,
    pub product: Product,
}

/// An order with its customer and items-with-products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub customer: Customer,
    pub items: Vec<OrderItemDetails>,
}

/// One priced line of a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Money,
    pub discount: Money,
    pub total: Money,
}

/// A fully priced order ready to be persisted.
///
/// The repository allocates the order number for `year`, inserts the order and
/// its lines, and reserves stock for every line in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub year: i32,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_cost: Money,
    pub discount: Money,
    pub total_amount: Money,
    pub notes: Option<String>,
    pub customer_notes: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub lines: Vec<NewOrderLine>,
}

/// A line item appended to an existing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    pub line: NewOrderLine,
}

/// Partial update of an order's free-form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderChanges {
    pub notes: Option<String>,
    pub customer_notes: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub tracking_number: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OrderChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Order list filter. Soft-deleted orders are always excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<CustomerId>,
    /// Case-insensitive exact match on the customer's email.
    pub customer_email: Option<String>,
    /// Case-insensitive substring of the order number.
    pub order_number: Option<String>,
    /// Keeps orders containing at least one item for this product.
    pub product_id: Option<ProductId>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub min_total: Option<Money>,
    pub max_total: Option<Money>,
}

impl OrderFilter {
    /// Evaluates the filter against an assembled order.
    pub fn matches(&self, details: &OrderDetails) -> bool {
        let order = &details.order;
        !order.is_deleted
            && self.status.is_none_or(|s| order.status == s)
            && self.customer_id.is_none_or(|c| order.customer_id == c)
            && self
                .customer_email
                .as_deref()
                .is_none_or(|e| details.customer.email.eq_ignore_ascii_case(e))
            && self.order_number.as_deref().is_none_or(|n| {
                order
                    .order_number
                    .to_lowercase()
                    .contains(&n.to_lowercase())
            })
            && self
                .product_id
                .is_none_or(|p| details.items.iter().any(|i| i.item.product_id == p))
            && self.created_from.is_none_or(|from| order.created_at >= from)
            && self.created_to.is_none_or(|to| order.created_at <= to)
            && self.min_total.is_none_or(|min| order.total_amount >= min)
            && self.max_total.is_none_or(|max| order.total_amount <= max)
    }
}

/// Order item list filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderItemFilter {
    pub order_id: Option<OrderId>,
    pub product_id: Option<ProductId>,
}

impl OrderItemFilter {
    pub fn matches(&self, item: &OrderItem) -> bool {
        self.order_id.is_none_or(|o| item.order_id == o)
            && self.product_id.is_none_or(|p| item.product_id == p)
    }
}

/// Aggregates over non-deleted orders. Revenue excludes cancelled orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub shipped: u64,
    pub cancelled: u64,
    pub total_revenue: Money,
    pub average_order_value: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_format() {
        assert_eq!(order_number(2026, 1), "ORD-2026-000001");
        assert_eq!(order_number(2026, 123_456), "ORD-2026-123456");
        assert_eq!(order_number(2027, 1_234_567), "ORD-2027-1234567");
    }

    #[test]
    fn test_restricted_transitions() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Pending));
        for next in OrderStatus::ALL {
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_can_delete() {
        assert!(OrderStatus::Pending.can_delete());
        assert!(OrderStatus::Cancelled.can_delete());
        assert!(!OrderStatus::Processing.can_delete());
        assert!(!OrderStatus::Shipped.can_delete());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
        let status: OrderStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(status, OrderStatus::Cancelled);
    }
}
