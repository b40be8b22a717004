use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    AppError, AppResult, CustomerId, ErrorCode, Money, OrderId, OrderItemId, Page, PageRequest,
    ProductId,
};
use sqlx::{PgConnection, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use super::customer::{CUSTOMER_COLUMNS, row_to_customer};
use super::product::{PRODUCT_COLUMNS, row_to_product};
use super::{PostgresStore, contains_pattern, count};
use crate::error::{check_cancellable, check_expected_status, check_pending, db_error, tx_error};
use crate::models::{
    NewOrder, NewOrderItem, NewOrderLine, Order, OrderChanges, OrderDetails, OrderFilter,
    OrderItem, OrderItemDetails, OrderItemFilter, OrderStats, OrderStatus, order_number,
};
use crate::repository::OrderRepository;

const ORDER_COLUMNS: &str = "o.id, o.order_number, o.status, o.customer_id, o.subtotal_cents, \
     o.tax_amount_cents, o.shipping_cost_cents, o.discount_cents, o.total_amount_cents, o.notes, \
     o.customer_notes, o.shipping_address, o.billing_address, o.tracking_number, o.shipped_at, \
     o.delivered_at, o.cancelled_at, o.cancel_reason, o.is_deleted, o.created_at, o.updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, unit_price_cents, discount_cents, \
     total_cents, created_at, updated_at";

fn row_to_order(row: &PgRow) -> sqlx::Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_number: row.try_get("order_number")?,
        status: row.try_get("status")?,
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
        tax_amount: Money::from_cents(row.try_get("tax_amount_cents")?),
        shipping_cost: Money::from_cents(row.try_get("shipping_cost_cents")?),
        discount: Money::from_cents(row.try_get("discount_cents")?),
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        notes: row.try_get("notes")?,
        customer_notes: row.try_get("customer_notes")?,
        shipping_address: row.try_get("shipping_address")?,
        billing_address: row.try_get("billing_address")?,
        tracking_number: row.try_get("tracking_number")?,
        shipped_at: row.try_get("shipped_at")?,
        delivered_at: row.try_get("delivered_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        cancel_reason: row.try_get("cancel_reason")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_item(row: &PgRow) -> sqlx::Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: row.try_get("quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        discount: Money::from_cents(row.try_get("discount_cents")?),
        total: Money::from_cents(row.try_get("total_cents")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_stats(row: &PgRow) -> sqlx::Result<OrderStats> {
    let total_revenue = Money::from_cents(row.try_get("revenue")?);
    let billable: i64 = row.try_get("billable")?;
    Ok(OrderStats {
        total: count(row, "total")?,
        pending: count(row, "pending")?,
        processing: count(row, "processing")?,
        shipped: count(row, "shipped")?,
        cancelled: count(row, "cancelled")?,
        total_revenue,
        average_order_value: total_revenue.average_over(billable),
    })
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    qb.push(" WHERE NOT o.is_deleted");
    if let Some(status) = filter.status {
        qb.push(" AND o.status = ").push_bind(status);
    }
    if let Some(customer_id) = filter.customer_id {
        qb.push(" AND o.customer_id = ").push_bind(customer_id.as_uuid());
    }
    if let Some(email) = &filter.customer_email {
        qb.push(" AND LOWER(c.email) = LOWER(")
            .push_bind(email.clone())
            .push(")");
    }
    if let Some(number) = &filter.order_number {
        qb.push(" AND o.order_number ILIKE ")
            .push_bind(contains_pattern(number));
    }
    if let Some(product_id) = filter.product_id {
        qb.push(" AND EXISTS (SELECT 1 FROM order_items i WHERE i.order_id = o.id AND i.product_id = ")
            .push_bind(product_id.as_uuid())
            .push(")");
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND o.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        qb.push(" AND o.created_at <= ").push_bind(to);
    }
    if let Some(min) = filter.min_total {
        qb.push(" AND o.total_amount_cents >= ").push_bind(min.cents());
    }
    if let Some(max) = filter.max_total {
        qb.push(" AND o.total_amount_cents <= ").push_bind(max.cents());
    }
}

/// Resolves customers and items-with-products for a batch of orders.
///
/// Customers and products are looked up regardless of their deleted flag so
/// historical orders keep resolving.
async fn load_details(conn: &mut PgConnection, orders: Vec<Order>) -> AppResult<Vec<OrderDetails>> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
    let customer_ids: Vec<Uuid> = orders.iter().map(|o| o.customer_id.as_uuid()).collect();

    let customer_rows = sqlx::query(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ANY($1)"
    ))
    .bind(customer_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;
    let customers = customer_rows
        .iter()
        .map(|row| row_to_customer(row).map(|c| (c.id, c)))
        .collect::<sqlx::Result<HashMap<_, _>>>()
        .map_err(db_error)?;

    let item_rows = sqlx::query(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY created_at ASC, id ASC"
    ))
    .bind(order_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;
    let items = item_rows
        .iter()
        .map(row_to_item)
        .collect::<sqlx::Result<Vec<_>>>()
        .map_err(db_error)?;

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id.as_uuid()).collect();
    let product_rows = sqlx::query(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
    ))
    .bind(product_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;
    let products = product_rows
        .iter()
        .map(|row| row_to_product(row).map(|p| (p.id, p)))
        .collect::<sqlx::Result<HashMap<_, _>>>()
        .map_err(db_error)?;

    let mut items_by_order: HashMap<OrderId, Vec<OrderItemDetails>> = HashMap::new();
    for item in items {
        let product = products.get(&item.product_id).cloned().ok_or_else(|| {
            AppError::repository(
                ErrorCode::DatabaseQueryError,
                format!("order item {} references missing product", item.id),
            )
        })?;
        items_by_order
            .entry(item.order_id)
            .or_default()
            .push(OrderItemDetails { item, product });
    }

    orders
        .into_iter()
        .map(|order| {
            let customer = customers.get(&order.customer_id).cloned().ok_or_else(|| {
                AppError::repository(
                    ErrorCode::DatabaseQueryError,
                    format!("order {} references missing customer", order.id),
                )
            })?;
            let items = items_by_order.remove(&order.id).unwrap_or_default();
            Ok(OrderDetails {
                order,
                customer,
                items,
            })
        })
        .collect()
}

/// Decrements stock for one line and inserts it, inside the caller's transaction.
async fn insert_line(
    conn: &mut PgConnection,
    order_id: OrderId,
    line: &NewOrderLine,
) -> AppResult<OrderItem> {
    let reserved = sqlx::query(
        "UPDATE products SET quantity = quantity - $2, updated_at = NOW() \
         WHERE id = $1 AND NOT is_deleted AND is_active AND quantity >= $2",
    )
    .bind(line.product_id.as_uuid())
    .bind(line.quantity)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?
    .rows_affected();

    if reserved == 0 {
        return Err(AppError::repository(
            ErrorCode::ProductInsufficientInventory,
            format!(
                "could not reserve {} units of product {}",
                line.quantity, line.product_id
            ),
        ));
    }

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO order_items (id, order_id, product_id, quantity, unit_price_cents, discount_cents, total_cents)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {ITEM_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(order_id.as_uuid())
    .bind(line.product_id.as_uuid())
    .bind(line.quantity)
    .bind(line.unit_price.cents())
    .bind(line.discount.cents())
    .bind(line.total.cents())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error)?;

    row_to_item(&row).map_err(db_error)
}

/// Locks a non-deleted order row for the rest of the transaction and returns
/// its status.
async fn lock_order_status(conn: &mut PgConnection, id: OrderId) -> AppResult<Option<OrderStatus>> {
    sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 AND NOT is_deleted FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(db_error)
}

impl PostgresStore {
    /// Loads a single order matching `sql`, bound to `key`, with its details.
    async fn fetch_order_details<K>(&self, sql: &str, key: K) -> AppResult<Option<OrderDetails>>
    where
        K: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
    {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let row = sqlx::query(sql)
            .bind(key)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let order = row_to_order(&row).map_err(db_error)?;
        Ok(load_details(&mut conn, vec![order]).await?.pop())
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn insert_order(&self, new_order: NewOrder) -> AppResult<OrderDetails> {
        let mut tx = self.pool.begin().await.map_err(tx_error)?;

        // Row lock on the year's counter serializes concurrent creations until commit.
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_number_sequences (year, last_value) VALUES ($1, 1)
            ON CONFLICT (year) DO UPDATE SET last_value = order_number_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(new_order.year)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders AS o (
                id, order_number, status, customer_id, subtotal_cents, tax_amount_cents,
                shipping_cost_cents, discount_cents, total_amount_cents, notes, customer_notes,
                shipping_address, billing_address
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(order_number(new_order.year, sequence))
        .bind(OrderStatus::Pending)
        .bind(new_order.customer_id.as_uuid())
        .bind(new_order.subtotal.cents())
        .bind(new_order.tax_amount.cents())
        .bind(new_order.shipping_cost.cents())
        .bind(new_order.discount.cents())
        .bind(new_order.total_amount.cents())
        .bind(&new_order.notes)
        .bind(&new_order.customer_notes)
        .bind(&new_order.shipping_address)
        .bind(&new_order.billing_address)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;
        let order = row_to_order(&row).map_err(db_error)?;

        for line in &new_order.lines {
            insert_line(&mut tx, order.id, line).await?;
        }

        let details = load_details(&mut tx, vec![order]).await?.pop().ok_or_else(|| {
            AppError::repository(ErrorCode::DatabaseQueryError, "created order vanished")
        })?;

        tx.commit().await.map_err(tx_error)?;
        Ok(details)
    }

    async fn get_order(&self, id: OrderId) -> AppResult<Option<OrderDetails>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = $1 AND NOT o.is_deleted");
        self.fetch_order_details(&sql, id.as_uuid()).await
    }

    async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> AppResult<Option<OrderDetails>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.order_number = $1 AND NOT o.is_deleted"
        );
        self.fetch_order_details(&sql, order_number.to_string())
            .await
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> AppResult<Page<OrderDetails>> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;

        let mut count_query = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM orders o JOIN customers c ON c.id = o.customer_id",
        );
        push_filter(&mut count_query, filter);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&mut *conn)
            .await
            .map_err(db_error)?;

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ORDER_COLUMNS} FROM orders o JOIN customers c ON c.id = o.customer_id"
        ));
        push_filter(&mut query, filter);
        query
            .push(" ORDER BY o.created_at DESC, o.order_number DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows = query.build().fetch_all(&mut *conn).await.map_err(db_error)?;

        let orders = rows
            .iter()
            .map(row_to_order)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(db_error)?;
        let details = load_details(&mut conn, orders).await?;
        Ok(Page::new(details, page, u64::try_from(total).unwrap_or_default()))
    }

    async fn update_order(
        &self,
        id: OrderId,
        changes: OrderChanges,
    ) -> AppResult<Option<Order>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders AS o SET
                notes = COALESCE($2, o.notes),
                customer_notes = COALESCE($3, o.customer_notes),
                shipping_address = COALESCE($4, o.shipping_address),
                billing_address = COALESCE($5, o.billing_address),
                tracking_number = COALESCE($6, o.tracking_number),
                delivered_at = COALESCE($7, o.delivered_at),
                updated_at = NOW()
            WHERE o.id = $1 AND NOT o.is_deleted
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(changes.notes)
        .bind(changes.customer_notes)
        .bind(changes.shipping_address)
        .bind(changes.billing_address)
        .bind(changes.tracking_number)
        .bind(changes.delivered_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref()
            .map(row_to_order)
            .transpose()
            .map_err(db_error)
    }

    async fn set_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> AppResult<Option<Order>> {
        let mut tx = self.pool.begin().await.map_err(tx_error)?;

        let Some(current) = lock_order_status(&mut tx, id).await? else {
            return Ok(None);
        };
        check_expected_status(id, current, expected)?;

        let shipped_at = (status == OrderStatus::Shipped).then(Utc::now);
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders AS o SET
                status = $2,
                shipped_at = COALESCE($3, o.shipped_at),
                updated_at = NOW()
            WHERE o.id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(status)
        .bind(shipped_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;
        let order = row_to_order(&row).map_err(db_error)?;

        tx.commit().await.map_err(tx_error)?;
        Ok(Some(order))
    }

    async fn cancel_order(
        &self,
        id: OrderId,
        reason: Option<String>,
    ) -> AppResult<Option<Order>> {
        let mut tx = self.pool.begin().await.map_err(tx_error)?;

        let Some(previous) = lock_order_status(&mut tx, id).await? else {
            return Ok(None);
        };
        check_cancellable(id, previous)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders AS o SET
                status = $2,
                cancelled_at = NOW(),
                cancel_reason = $3,
                updated_at = NOW()
            WHERE o.id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(OrderStatus::Cancelled)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;
        let order = row_to_order(&row).map_err(db_error)?;

        sqlx::query(
            r#"
            UPDATE products AS p SET
                quantity = p.quantity + r.quantity,
                updated_at = NOW()
            FROM (
                SELECT product_id, SUM(quantity)::INTEGER AS quantity
                FROM order_items
                WHERE order_id = $1
                GROUP BY product_id
            ) AS r
            WHERE p.id = r.product_id
            "#,
        )
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(tx_error)?;
        Ok(Some(order))
    }

    async fn soft_delete_order(&self, id: OrderId) -> AppResult<bool> {
        let rows_affected = sqlx::query(
            "UPDATE orders SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error)?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn order_stats(&self) -> AppResult<OrderStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'PENDING') AS pending,
                COUNT(*) FILTER (WHERE status = 'PROCESSING') AS processing,
                COUNT(*) FILTER (WHERE status = 'SHIPPED') AS shipped,
                COUNT(*) FILTER (WHERE status = 'CANCELLED') AS cancelled,
                COUNT(*) FILTER (WHERE status <> 'CANCELLED') AS billable,
                COALESCE(SUM(total_amount_cents) FILTER (WHERE status <> 'CANCELLED'), 0)::BIGINT AS revenue
            FROM orders
            WHERE NOT is_deleted
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        row_to_stats(&row).map_err(db_error)
    }

    async fn insert_order_item(&self, new_item: NewOrderItem) -> AppResult<OrderItem> {
        let mut tx = self.pool.begin().await.map_err(tx_error)?;

        let Some(status) = lock_order_status(&mut tx, new_item.order_id).await? else {
            return Err(AppError::repository(
                ErrorCode::DatabaseConstraintViolation,
                "order item references a missing order",
            ));
        };
        check_pending(new_item.order_id, status)?;

        let item = insert_line(&mut tx, new_item.order_id, &new_item.line).await?;
        tx.commit().await.map_err(tx_error)?;
        Ok(item)
    }

    async fn get_order_item(&self, id: OrderItemId) -> AppResult<Option<OrderItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref()
            .map(row_to_item)
            .transpose()
            .map_err(db_error)
    }

    async fn list_order_items(
        &self,
        filter: &OrderItemFilter,
        page: PageRequest,
    ) -> AppResult<Page<OrderItem>> {
        fn push_item_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderItemFilter) {
            qb.push(" WHERE TRUE");
            if let Some(order_id) = filter.order_id {
                qb.push(" AND order_id = ").push_bind(order_id.as_uuid());
            }
            if let Some(product_id) = filter.product_id {
                qb.push(" AND product_id = ").push_bind(product_id.as_uuid());
            }
        }

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM order_items");
        push_item_filter(&mut count_query, filter);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {ITEM_COLUMNS} FROM order_items"));
        push_item_filter(&mut query, filter);
        query
            .push(" ORDER BY created_at ASC, id ASC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows = query.build().fetch_all(&self.pool).await.map_err(db_error)?;

        let items = rows
            .iter()
            .map(row_to_item)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(db_error)?;
        Ok(Page::new(items, page, u64::try_from(total).unwrap_or_default()))
    }
}
