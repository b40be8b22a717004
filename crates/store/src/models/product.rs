use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// The fixed catalog of item kinds the shop sells.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "product_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductKind {
    Racket,
    TennisBalls,
    Strings,
    Overgrip,
    Bag,
    Shoes,
    Apparel,
    Accessory,
}

/// Product tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "product_category", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductCategory {
    Beginner,
    Intermediate,
    Professional,
}

/// A sellable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: ProductKind,
    pub description: Option<String>,
    pub price: Money,
    /// Units available for sale. Never negative.
    pub quantity: i32,
    pub category: ProductCategory,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub sku: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Inventory value of this product (`price × quantity`), or `None` if it
    /// does not fit in 64-bit cents.
    pub fn inventory_value(&self) -> Option<Money> {
        self.price.checked_multiply(i64::from(self.quantity))
    }
}

/// Input for inserting a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: ProductKind,
    pub description: Option<String>,
    pub price: Money,
    pub quantity: i32,
    pub category: ProductCategory,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub sku: Option<String>,
    pub image_url: Option<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductChanges {
    pub name: Option<ProductKind>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub quantity: Option<i32>,
    pub category: Option<ProductCategory>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub sku: Option<String>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

/// Product list filter. Soft-deleted products are always excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductFilter {
    pub name: Option<ProductKind>,
    pub category: Option<ProductCategory>,
    /// Case-insensitive exact brand match.
    pub brand: Option<String>,
    pub is_active: Option<bool>,
    /// `true` keeps products with quantity > 0, `false` keeps sold-out ones.
    pub in_stock: Option<bool>,
    /// When set, keeps products with quantity at or below the threshold.
    pub max_quantity: Option<i32>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        !product.is_deleted
            && self.name.is_none_or(|n| product.name == n)
            && self.category.is_none_or(|c| product.category == c)
            && self.brand.as_deref().is_none_or(|b| {
                product
                    .brand
                    .as_deref()
                    .is_some_and(|pb| pb.eq_ignore_ascii_case(b))
            })
            && self.is_active.is_none_or(|a| product.is_active == a)
            && self
                .in_stock
                .is_none_or(|in_stock| (product.quantity > 0) == in_stock)
            && self.max_quantity.is_none_or(|max| product.quantity <= max)
    }
}

/// Catalog-wide aggregates over non-deleted products.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub low_stock: u64,
    pub out_of_stock: u64,
    pub total_inventory_value: Money,
}
