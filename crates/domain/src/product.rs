//! Product catalogue and inventory rules.

use common::{AppError, AppResult, ErrorCode, Money, Page, PageRequest, ProductId};
use store::{
    NewProduct, Product, ProductCategory, ProductChanges, ProductFilter, ProductRepository,
    ProductStats,
};

/// Highest accepted unit price.
pub const MAX_PRODUCT_PRICE: Money = Money::from_units(10_000_000);

/// Threshold used when none is configured.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 10;

pub(crate) fn validate_price(price: Money) -> AppResult<()> {
    if price.is_negative() || price > MAX_PRODUCT_PRICE {
        return Err(AppError::service(
            ErrorCode::ProductInvalidPrice,
            format!("price must be between {} and {MAX_PRODUCT_PRICE}", Money::zero()),
        ));
    }
    Ok(())
}

pub(crate) fn validate_stock_level(quantity: i32) -> AppResult<()> {
    if quantity < 0 {
        return Err(AppError::service(
            ErrorCode::ProductInvalidQuantity,
            format!("quantity must be a non-negative integer, got {quantity}"),
        ));
    }
    Ok(())
}

/// Requested unit counts (reservations, order lines) must be positive.
pub(crate) fn validate_requested_quantity(quantity: i32) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::service(
            ErrorCode::ProductInvalidQuantity,
            format!("quantity must be greater than 0, got {quantity}"),
        ));
    }
    Ok(())
}

pub(crate) fn product_not_found(id: ProductId) -> AppError {
    AppError::service(ErrorCode::ProductNotFound, format!("product {id} not found"))
}

/// Service for the product catalogue and its stock levels.
#[derive(Clone)]
pub struct ProductService<S> {
    store: S,
    low_stock_threshold: i32,
}

impl<S: ProductRepository> ProductService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }

    /// Overrides the quantity at or below which a product counts as low on stock.
    pub fn with_low_stock_threshold(mut self, threshold: i32) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    pub fn low_stock_threshold(&self) -> i32 {
        self.low_stock_threshold
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_by_id(&self, id: ProductId) -> AppResult<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| product_not_found(id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_many(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> AppResult<Page<Product>> {
        self.store.list_products(filter, page).await
    }

    pub async fn get_active(&self, page: PageRequest) -> AppResult<Page<Product>> {
        let filter = ProductFilter {
            is_active: Some(true),
            ..Default::default()
        };
        self.find_many(&filter, page).await
    }

    pub async fn get_by_category(
        &self,
        category: ProductCategory,
        page: PageRequest,
    ) -> AppResult<Page<Product>> {
        let filter = ProductFilter {
            category: Some(category),
            is_active: Some(true),
            ..Default::default()
        };
        self.find_many(&filter, page).await
    }

    /// Active products with at most `threshold` units left.
    pub async fn get_low_stock(
        &self,
        threshold: Option<i32>,
        page: PageRequest,
    ) -> AppResult<Page<Product>> {
        let threshold = threshold.unwrap_or(self.low_stock_threshold);
        validate_stock_level(threshold)?;
        let filter = ProductFilter {
            is_active: Some(true),
            max_quantity: Some(threshold),
            ..Default::default()
        };
        self.find_many(&filter, page).await
    }

    #[tracing::instrument(skip(self, input), fields(sku = ?input.sku))]
    pub async fn create(&self, input: NewProduct) -> AppResult<Product> {
        validate_price(input.price)?;
        validate_stock_level(input.quantity)?;
        if let Some(sku) = input.sku.as_deref() {
            self.ensure_sku_available(sku, None).await?;
        }

        let product = self.store.insert_product(input).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self, changes))]
    pub async fn update(&self, id: ProductId, changes: ProductChanges) -> AppResult<Product> {
        if let Some(price) = changes.price {
            validate_price(price)?;
        }
        if let Some(quantity) = changes.quantity {
            validate_stock_level(quantity)?;
        }
        self.find_by_id(id).await?;
        if let Some(sku) = changes.sku.as_deref() {
            self.ensure_sku_available(sku, Some(id)).await?;
        }

        self.store
            .update_product(id, changes)
            .await?
            .ok_or_else(|| product_not_found(id))
    }

    /// Sets the available quantity to an absolute value.
    #[tracing::instrument(skip(self))]
    pub async fn update_stock(&self, id: ProductId, quantity: i32) -> AppResult<Product> {
        validate_stock_level(quantity)?;
        self.store
            .set_product_stock(id, quantity)
            .await?
            .ok_or_else(|| product_not_found(id))
    }

    /// Takes `quantity` units out of the available stock.
    ///
    /// # Errors
    ///
    /// `PRODUCT_INACTIVE` for deactivated products and
    /// `PRODUCT_INSUFFICIENT_INVENTORY` when fewer units are available. The
    /// quantity is left unchanged on failure.
    #[tracing::instrument(skip(self))]
    pub async fn reserve_stock(&self, id: ProductId, quantity: i32) -> AppResult<Product> {
        validate_requested_quantity(quantity)?;
        let product = self.find_by_id(id).await?;
        ensure_active(&product)?;

        match self.store.reserve_stock(id, quantity).await? {
            Some(product) => {
                tracing::info!(product_id = %id, quantity, remaining = product.quantity, "stock reserved");
                Ok(product)
            }
            None => {
                metrics::counter!("stock_reservation_failures_total").increment(1);
                // Re-read so the message reflects the state that made the guard fail.
                let current = self.find_by_id(id).await?;
                ensure_active(&current)?;
                tracing::warn!(product_id = %id, requested = quantity, available = current.quantity, "stock reservation rejected");
                Err(insufficient_inventory(&current, i64::from(quantity)))
            }
        }
    }

    /// Puts `quantity` units back into the available stock.
    #[tracing::instrument(skip(self))]
    pub async fn restore_stock(&self, id: ProductId, quantity: i32) -> AppResult<Product> {
        validate_requested_quantity(quantity)?;
        let product = self
            .store
            .restore_stock(id, quantity)
            .await?
            .ok_or_else(|| product_not_found(id))?;
        tracing::info!(product_id = %id, quantity, available = product.quantity, "stock restored");
        Ok(product)
    }

    pub async fn activate(&self, id: ProductId) -> AppResult<Product> {
        self.set_active(id, true).await
    }

    pub async fn deactivate(&self, id: ProductId) -> AppResult<Product> {
        self.set_active(id, false).await
    }

    /// Soft-deletes the product and deactivates it.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: ProductId) -> AppResult<()> {
        if !self.store.soft_delete_product(id).await? {
            return Err(product_not_found(id));
        }
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    pub async fn get_stats(&self) -> AppResult<ProductStats> {
        self.store.product_stats(self.low_stock_threshold).await
    }

    async fn set_active(&self, id: ProductId, active: bool) -> AppResult<Product> {
        self.store
            .set_product_active(id, active)
            .await?
            .ok_or_else(|| product_not_found(id))
    }

    async fn ensure_sku_available(&self, sku: &str, owner: Option<ProductId>) -> AppResult<()> {
        match self.store.get_product_by_sku(sku).await? {
            Some(existing) if Some(existing.id) != owner => Err(AppError::service(
                ErrorCode::DatabaseConstraintViolation,
                format!("a product with SKU {sku} already exists"),
            )),
            _ => Ok(()),
        }
    }
}

pub(crate) fn ensure_active(product: &Product) -> AppResult<()> {
    if !product.is_active {
        return Err(AppError::service(
            ErrorCode::ProductInactive,
            format!("product {} is inactive", product.id),
        ));
    }
    Ok(())
}

pub(crate) fn insufficient_inventory(product: &Product, requested: i64) -> AppError {
    AppError::service(
        ErrorCode::ProductInsufficientInventory,
        format!(
            "insufficient inventory for product {}: requested {requested}, available {}",
            product.id, product.quantity
        ),
    )
}

#[cfg(test)]
mod tests {
    use store::{InMemoryStore, ProductKind};

    use super::*;

    fn service() -> ProductService<InMemoryStore> {
        ProductService::new(InMemoryStore::new())
    }

    fn balls(quantity: i32) -> NewProduct {
        NewProduct {
            name: ProductKind::TennisBalls,
            description: None,
            price: Money::from_units(12),
            quantity,
            category: ProductCategory::Beginner,
            brand: Some("Head".to_string()),
            model: None,
            sku: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_rejects_price_out_of_range() {
        let service = service();

        let mut input = balls(1);
        input.price = Money::from_cents(-1);
        let err = service.create(input).await.unwrap_err();
        assert!(err.is(ErrorCode::ProductInvalidPrice));

        let mut input = balls(1);
        input.price = Money::from_units(10_000_001);
        let err = service.create(input).await.unwrap_err();
        assert!(err.is(ErrorCode::ProductInvalidPrice));

        let mut input = balls(1);
        input.price = MAX_PRODUCT_PRICE;
        assert!(service.create(input).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_negative_quantity() {
        let err = service().create(balls(-1)).await.unwrap_err();
        assert!(err.is(ErrorCode::ProductInvalidQuantity));
    }

    #[tokio::test]
    async fn test_create_is_active() {
        let product = service().create(balls(3)).await.unwrap();
        assert!(product.is_active);
    }

    #[tokio::test]
    async fn test_duplicate_sku_conflicts() {
        let service = service();
        let mut input = balls(1);
        input.sku = Some("HEAD-ATP".to_string());
        service.create(input.clone()).await.unwrap();

        let err = service.create(input).await.unwrap_err();
        assert!(err.is(ErrorCode::DatabaseConstraintViolation));
    }

    #[tokio::test]
    async fn test_update_keeps_own_sku() {
        let service = service();
        let mut input = balls(1);
        input.sku = Some("HEAD-ATP".to_string());
        let product = service.create(input).await.unwrap();

        let updated = service
            .update(
                product.id,
                ProductChanges {
                    sku: Some("HEAD-ATP".to_string()),
                    price: Some(Money::from_units(15)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.price, Money::from_units(15));
    }

    #[tokio::test]
    async fn test_update_revalidates_quantity() {
        let service = service();
        let product = service.create(balls(1)).await.unwrap();
        let err = service
            .update(
                product.id,
                ProductChanges {
                    quantity: Some(-5),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::ProductInvalidQuantity));
    }

    #[tokio::test]
    async fn test_update_missing_product() {
        let err = service()
            .update(ProductId::new(), ProductChanges::default())
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::ProductNotFound));
    }

    #[tokio::test]
    async fn test_reserve_more_than_available_leaves_quantity() {
        let service = service();
        let product = service.create(balls(5)).await.unwrap();

        let err = service.reserve_stock(product.id, 6).await.unwrap_err();
        assert!(err.is(ErrorCode::ProductInsufficientInventory));
        assert_eq!(service.find_by_id(product.id).await.unwrap().quantity, 5);

        let reserved = service.reserve_stock(product.id, 5).await.unwrap();
        assert_eq!(reserved.quantity, 0);
    }

    #[tokio::test]
    async fn test_reserve_inactive_product() {
        let service = service();
        let product = service.create(balls(5)).await.unwrap();
        service.deactivate(product.id).await.unwrap();

        let err = service.reserve_stock(product.id, 1).await.unwrap_err();
        assert!(err.is(ErrorCode::ProductInactive));
    }

    #[tokio::test]
    async fn test_restore_stock() {
        let service = service();
        let product = service.create(balls(5)).await.unwrap();
        let restored = service.restore_stock(product.id, 3).await.unwrap();
        assert_eq!(restored.quantity, 8);

        let err = service.restore_stock(product.id, 0).await.unwrap_err();
        assert!(err.is(ErrorCode::ProductInvalidQuantity));
    }

    #[tokio::test]
    async fn test_delete_hides_and_deactivates() {
        let service = service();
        let product = service.create(balls(5)).await.unwrap();
        service.delete(product.id).await.unwrap();

        let err = service.find_by_id(product.id).await.unwrap_err();
        assert!(err.is(ErrorCode::ProductNotFound));
        let err = service.delete(product.id).await.unwrap_err();
        assert!(err.is(ErrorCode::ProductNotFound));
    }

    #[tokio::test]
    async fn test_low_stock_uses_threshold() {
        let service = service().with_low_stock_threshold(4);
        service.create(balls(2)).await.unwrap();
        service.create(balls(4)).await.unwrap();
        service.create(balls(9)).await.unwrap();

        let page = service
            .get_low_stock(None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.data.len(), 2);

        let page = service
            .get_low_stock(Some(10), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.data.len(), 3);

        let stats = service.get_stats().await.unwrap();
        assert_eq!(stats.low_stock, 2);
    }
}
