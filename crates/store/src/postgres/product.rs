use async_trait::async_trait;
use common::{AppResult, Money, Page, PageRequest, ProductId};
use sqlx::{Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use super::{PostgresStore, count};
use crate::error::db_error;
use crate::models::{NewProduct, Product, ProductChanges, ProductFilter, ProductStats};
use crate::repository::ProductRepository;

pub(super) const PRODUCT_COLUMNS: &str = "id, name, description, price_cents, quantity, category, \
     brand, model, sku, image_url, is_active, is_deleted, created_at, updated_at";

pub(super) fn row_to_product(row: &PgRow) -> sqlx::Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        quantity: row.try_get("quantity")?,
        category: row.try_get("category")?,
        brand: row.try_get("brand")?,
        model: row.try_get("model")?,
        sku: row.try_get("sku")?,
        image_url: row.try_get("image_url")?,
        is_active: row.try_get("is_active")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_stats(row: &PgRow) -> sqlx::Result<ProductStats> {
    Ok(ProductStats {
        total: count(row, "total")?,
        active: count(row, "active")?,
        inactive: count(row, "inactive")?,
        low_stock: count(row, "low_stock")?,
        out_of_stock: count(row, "out_of_stock")?,
        total_inventory_value: Money::from_cents(row.try_get("inventory_value")?),
    })
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE NOT is_deleted");
    if let Some(name) = filter.name {
        qb.push(" AND name = ").push_bind(name);
    }
    if let Some(category) = filter.category {
        qb.push(" AND category = ").push_bind(category);
    }
    if let Some(brand) = &filter.brand {
        qb.push(" AND LOWER(brand) = LOWER(")
            .push_bind(brand.clone())
            .push(")");
    }
    if let Some(is_active) = filter.is_active {
        qb.push(" AND is_active = ").push_bind(is_active);
    }
    match filter.in_stock {
        Some(true) => {
            qb.push(" AND quantity > 0");
        }
        Some(false) => {
            qb.push(" AND quantity = 0");
        }
        None => {}
    }
    if let Some(max) = filter.max_quantity {
        qb.push(" AND quantity <= ").push_bind(max);
    }
}

impl PostgresStore {
    async fn fetch_product(&self, sql: &str, id: ProductId) -> AppResult<Option<Product>> {
        let row = sqlx::query(sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref()
            .map(row_to_product)
            .transpose()
            .map_err(db_error)
    }

    async fn update_quantity(
        &self,
        sql: &str,
        id: ProductId,
        quantity: i32,
    ) -> AppResult<Option<Product>> {
        let row = sqlx::query(sql)
            .bind(id.as_uuid())
            .bind(quantity)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref()
            .map(row_to_product)
            .transpose()
            .map_err(db_error)
    }
}

#[async_trait]
impl ProductRepository for PostgresStore {
    async fn get_product(&self, id: ProductId) -> AppResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND NOT is_deleted");
        self.fetch_product(&sql, id).await
    }

    async fn get_products(&self, ids: &[ProductId]) -> AppResult<Vec<Product>> {
        let uuids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) AND NOT is_deleted"
        ))
        .bind(uuids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter()
            .map(row_to_product)
            .collect::<sqlx::Result<_>>()
            .map_err(db_error)
    }

    async fn get_product_by_sku(&self, sku: &str) -> AppResult<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = $1"))
            .bind(sku)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref()
            .map(row_to_product)
            .transpose()
            .map_err(db_error)
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> AppResult<Page<Product>> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_filter(&mut query, filter);
        query
            .push(" ORDER BY name ASC, created_at DESC, id ASC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows = query.build().fetch_all(&self.pool).await.map_err(db_error)?;

        let products = rows
            .iter()
            .map(row_to_product)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(db_error)?;
        Ok(Page::new(products, page, u64::try_from(total).unwrap_or_default()))
    }

    async fn insert_product(&self, product: NewProduct) -> AppResult<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (id, name, description, price_cents, quantity, category, brand, model, sku, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.quantity)
        .bind(product.category)
        .bind(&product.brand)
        .bind(&product.model)
        .bind(&product.sku)
        .bind(&product.image_url)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        row_to_product(&row).map_err(db_error)
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> AppResult<Option<Product>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                quantity = COALESCE($5, quantity),
                category = COALESCE($6, category),
                brand = COALESCE($7, brand),
                model = COALESCE($8, model),
                sku = COALESCE($9, sku),
                image_url = COALESCE($10, image_url),
                is_active = COALESCE($11, is_active),
                updated_at = NOW()
            WHERE id = $1 AND NOT is_deleted
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.price.map(|p| p.cents()))
        .bind(changes.quantity)
        .bind(changes.category)
        .bind(changes.brand)
        .bind(changes.model)
        .bind(changes.sku)
        .bind(changes.image_url)
        .bind(changes.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref()
            .map(row_to_product)
            .transpose()
            .map_err(db_error)
    }

    async fn set_product_stock(&self, id: ProductId, quantity: i32) -> AppResult<Option<Product>> {
        let sql = format!(
            "UPDATE products SET quantity = $2, updated_at = NOW() \
             WHERE id = $1 AND NOT is_deleted RETURNING {PRODUCT_COLUMNS}"
        );
        self.update_quantity(&sql, id, quantity).await
    }

    async fn reserve_stock(&self, id: ProductId, quantity: i32) -> AppResult<Option<Product>> {
        let sql = format!(
            "UPDATE products SET quantity = quantity - $2, updated_at = NOW() \
             WHERE id = $1 AND NOT is_deleted AND is_active AND quantity >= $2 \
             RETURNING {PRODUCT_COLUMNS}"
        );
        self.update_quantity(&sql, id, quantity).await
    }

    async fn restore_stock(&self, id: ProductId, quantity: i32) -> AppResult<Option<Product>> {
        let sql = format!(
            "UPDATE products SET quantity = quantity + $2, updated_at = NOW() \
             WHERE id = $1 AND NOT is_deleted RETURNING {PRODUCT_COLUMNS}"
        );
        self.update_quantity(&sql, id, quantity).await
    }

    async fn set_product_active(
        &self,
        id: ProductId,
        active: bool,
    ) -> AppResult<Option<Product>> {
        let row = sqlx::query(&format!(
            "UPDATE products SET is_active = $2, updated_at = NOW() \
             WHERE id = $1 AND NOT is_deleted RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref()
            .map(row_to_product)
            .transpose()
            .map_err(db_error)
    }

    async fn soft_delete_product(&self, id: ProductId) -> AppResult<bool> {
        let rows_affected = sqlx::query(
            "UPDATE products SET is_deleted = TRUE, is_active = FALSE, updated_at = NOW() \
             WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error)?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn product_stats(&self, low_stock_threshold: i32) -> AppResult<ProductStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE is_active) AS active,
                COUNT(*) FILTER (WHERE NOT is_active) AS inactive,
                COUNT(*) FILTER (WHERE quantity <= $1) AS low_stock,
                COUNT(*) FILTER (WHERE quantity = 0) AS out_of_stock,
                COALESCE(SUM(price_cents * quantity), 0)::BIGINT AS inventory_value
            FROM products
            WHERE NOT is_deleted
            "#,
        )
        .bind(low_stock_threshold)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        row_to_stats(&row).map_err(db_error)
    }
}
