//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{ErrorCode, Money, PageRequest};
use sqlx::PgPool;
use store::{
    CustomerFilter, CustomerRepository, NewCustomer, NewOrder, NewOrderItem, NewOrderLine,
    NewProduct, OrderFilter, OrderItemFilter, OrderRepository, OrderStatus, PostgresStore,
    ProductCategory, ProductFilter, ProductKind, ProductRepository,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!("../../../migrations/001_create_tables.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_items, orders, order_number_sequences, customers, products CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn racket(sku: &str, units: i64, quantity: i32) -> NewProduct {
    NewProduct {
        name: ProductKind::Racket,
        description: Some("Graphite frame".to_string()),
        price: Money::from_units(units),
        quantity,
        category: ProductCategory::Professional,
        brand: Some("Wilson".to_string()),
        model: Some("Pro Staff".to_string()),
        sku: Some(sku.to_string()),
        image_url: None,
    }
}

fn customer(email: &str) -> NewCustomer {
    NewCustomer {
        name: "Ana Torres".to_string(),
        email: email.to_string(),
        city: Some("Bogota".to_string()),
        ..Default::default()
    }
}

fn line(product: &store::Product, quantity: i32) -> NewOrderLine {
    let total = product.price.checked_multiply(i64::from(quantity)).unwrap();
    NewOrderLine {
        product_id: product.id,
        quantity,
        unit_price: product.price,
        discount: Money::zero(),
        total,
    }
}

fn new_order(customer_id: common::CustomerId, lines: Vec<NewOrderLine>) -> NewOrder {
    let subtotal = Money::checked_sum(lines.iter().map(|l| l.total)).unwrap();
    let tax_amount = subtotal.checked_percent(19).unwrap();
    NewOrder {
        customer_id,
        year: 2026,
        subtotal,
        tax_amount,
        shipping_cost: Money::zero(),
        discount: Money::zero(),
        total_amount: subtotal + tax_amount,
        notes: None,
        customer_notes: None,
        shipping_address: Some("Calle 1".to_string()),
        billing_address: None,
        lines,
    }
}

#[tokio::test]
async fn insert_and_fetch_product() {
    let store = get_test_store().await;

    let product = store.insert_product(racket("WIL-PS-1", 1000, 10)).await.unwrap();
    assert!(product.is_active);
    assert!(!product.is_deleted);

    let fetched = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(fetched, product);

    let by_sku = store.get_product_by_sku("WIL-PS-1").await.unwrap().unwrap();
    assert_eq!(by_sku.id, product.id);
}

#[tokio::test]
async fn duplicate_sku_is_constraint_violation() {
    let store = get_test_store().await;

    store.insert_product(racket("DUP-1", 100, 1)).await.unwrap();
    let err = store.insert_product(racket("DUP-1", 100, 1)).await.unwrap_err();
    assert!(err.is(ErrorCode::DatabaseConstraintViolation));
}

#[tokio::test]
async fn reserve_stock_guards_quantity_and_active_flag() {
    let store = get_test_store().await;
    let product = store.insert_product(racket("RES-1", 100, 3)).await.unwrap();

    let reserved = store.reserve_stock(product.id, 2).await.unwrap().unwrap();
    assert_eq!(reserved.quantity, 1);

    assert!(store.reserve_stock(product.id, 2).await.unwrap().is_none());

    store.set_product_active(product.id, false).await.unwrap();
    assert!(store.reserve_stock(product.id, 1).await.unwrap().is_none());

    let restored = store.restore_stock(product.id, 2).await.unwrap().unwrap();
    assert_eq!(restored.quantity, 3);
}

#[tokio::test]
async fn soft_deleted_product_is_hidden_but_sku_stays_taken() {
    let store = get_test_store().await;
    let product = store.insert_product(racket("DEL-1", 100, 3)).await.unwrap();

    assert!(store.soft_delete_product(product.id).await.unwrap());
    assert!(store.get_product(product.id).await.unwrap().is_none());
    assert!(!store.soft_delete_product(product.id).await.unwrap());

    let by_sku = store.get_product_by_sku("DEL-1").await.unwrap().unwrap();
    assert!(by_sku.is_deleted);
    assert!(!by_sku.is_active);

    let page = store
        .list_products(&ProductFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 0);
}

#[tokio::test]
async fn product_stats_counts_low_and_out_of_stock() {
    let store = get_test_store().await;
    store.insert_product(racket("ST-1", 10, 0)).await.unwrap();
    store.insert_product(racket("ST-2", 10, 5)).await.unwrap();
    let inactive = store.insert_product(racket("ST-3", 10, 50)).await.unwrap();
    store.set_product_active(inactive.id, false).await.unwrap();

    let stats = store.product_stats(10).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.active, 2);
    assert_eq!(stats.inactive, 1);
    assert_eq!(stats.out_of_stock, 1);
    assert_eq!(stats.low_stock, 2);
    assert_eq!(stats.total_inventory_value, Money::from_units(550));
}

#[tokio::test]
async fn customer_email_is_unique_case_insensitively() {
    let store = get_test_store().await;

    let ana = store.insert_customer(customer("ana@example.com")).await.unwrap();
    let err = store
        .insert_customer(customer("ANA@example.com"))
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::DatabaseConstraintViolation));

    let found = store
        .get_customer_by_email("Ana@Example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, ana.id);

    assert!(store.soft_delete_customer(ana.id).await.unwrap());
    store.insert_customer(customer("ana@example.com")).await.unwrap();
}

#[tokio::test]
async fn list_customers_filters_by_search_and_city() {
    let store = get_test_store().await;
    store.insert_customer(customer("ana@example.com")).await.unwrap();
    store
        .insert_customer(NewCustomer {
            name: "Luis Perez".to_string(),
            email: "luis@club.com".to_string(),
            city: Some("Lima".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let filter = CustomerFilter {
        search: Some("CLUB".to_string()),
        ..Default::default()
    };
    let page = store
        .list_customers(&filter, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].email, "luis@club.com");

    let filter = CustomerFilter {
        city: Some("bogota".to_string()),
        ..Default::default()
    };
    let page = store
        .list_customers(&filter, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].email, "ana@example.com");
}

#[tokio::test]
async fn insert_order_reserves_stock_and_numbers_sequentially() {
    let store = get_test_store().await;
    let p = store.insert_product(racket("ORD-P", 100000, 10)).await.unwrap();
    let q = store.insert_product(racket("ORD-Q", 25000, 50)).await.unwrap();
    let buyer = store.insert_customer(customer("buyer@example.com")).await.unwrap();

    let first = store
        .insert_order(new_order(buyer.id, vec![line(&p, 1), line(&q, 2)]))
        .await
        .unwrap();
    assert_eq!(first.order.order_number, "ORD-2026-000001");
    assert_eq!(first.order.status, OrderStatus::Pending);
    assert_eq!(first.order.subtotal, Money::from_units(150000));
    assert_eq!(first.order.tax_amount, Money::from_units(28500));
    assert_eq!(first.order.total_amount, Money::from_units(178500));
    assert_eq!(first.customer.id, buyer.id);
    assert_eq!(first.items.len(), 2);

    assert_eq!(store.get_product(p.id).await.unwrap().unwrap().quantity, 9);
    assert_eq!(store.get_product(q.id).await.unwrap().unwrap().quantity, 48);

    let second = store
        .insert_order(new_order(buyer.id, vec![line(&q, 1)]))
        .await
        .unwrap();
    assert_eq!(second.order.order_number, "ORD-2026-000002");

    let by_number = store
        .get_order_by_number("ORD-2026-000002")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_number.order.id, second.order.id);
}

#[tokio::test]
async fn failed_reservation_rolls_back_whole_order() {
    let store = get_test_store().await;
    let p = store.insert_product(racket("RB-P", 100, 5)).await.unwrap();
    let q = store.insert_product(racket("RB-Q", 100, 1)).await.unwrap();
    let buyer = store.insert_customer(customer("rb@example.com")).await.unwrap();

    let err = store
        .insert_order(new_order(buyer.id, vec![line(&p, 2), line(&q, 3)]))
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::ProductInsufficientInventory));

    assert_eq!(store.get_product(p.id).await.unwrap().unwrap().quantity, 5);
    assert_eq!(store.get_product(q.id).await.unwrap().unwrap().quantity, 1);

    let page = store
        .list_orders(&OrderFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 0);
}

#[tokio::test]
async fn cancel_restores_stock_once() {
    let store = get_test_store().await;
    let p = store.insert_product(racket("CX-P", 100, 10)).await.unwrap();
    let buyer = store.insert_customer(customer("cx@example.com")).await.unwrap();

    let order = store
        .insert_order(new_order(buyer.id, vec![line(&p, 2), line(&p, 3)]))
        .await
        .unwrap();
    assert_eq!(store.get_product(p.id).await.unwrap().unwrap().quantity, 5);

    let cancelled = store
        .cancel_order(order.order.id, Some("changed mind".to_string()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("changed mind"));
    assert_eq!(store.get_product(p.id).await.unwrap().unwrap().quantity, 10);

    let err = store.cancel_order(order.order.id, None).await.unwrap_err();
    assert!(err.is(ErrorCode::OrderAlreadyCancelled));
    assert_eq!(store.get_product(p.id).await.unwrap().unwrap().quantity, 10);
    let details = store.get_order(order.order.id).await.unwrap().unwrap();
    assert_eq!(details.order.cancel_reason.as_deref(), Some("changed mind"));
}

#[tokio::test]
async fn status_write_with_stale_expected_status_is_rejected() {
    let store = get_test_store().await;
    let p = store.insert_product(racket("ST-P", 100, 10)).await.unwrap();
    let buyer = store.insert_customer(customer("st@example.com")).await.unwrap();
    let order = store
        .insert_order(new_order(buyer.id, vec![line(&p, 3)]))
        .await
        .unwrap();

    store.cancel_order(order.order.id, None).await.unwrap();
    let err = store
        .set_order_status(order.order.id, OrderStatus::Pending, OrderStatus::Processing)
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::OrderInvalidStatusTransition));

    let details = store.get_order(order.order.id).await.unwrap().unwrap();
    assert_eq!(details.order.status, OrderStatus::Cancelled);
    assert_eq!(store.get_product(p.id).await.unwrap().unwrap().quantity, 10);
}

#[tokio::test]
async fn item_cannot_land_on_cancelled_order() {
    let store = get_test_store().await;
    let p = store.insert_product(racket("IC-P", 100, 10)).await.unwrap();
    let buyer = store.insert_customer(customer("ic@example.com")).await.unwrap();
    let order = store
        .insert_order(new_order(buyer.id, vec![line(&p, 1)]))
        .await
        .unwrap();
    store.cancel_order(order.order.id, None).await.unwrap();

    let err = store
        .insert_order_item(NewOrderItem {
            order_id: order.order.id,
            line: line(&p, 2),
        })
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::OrderCannotModify));
    assert_eq!(store.get_product(p.id).await.unwrap().unwrap().quantity, 10);
}

#[tokio::test]
async fn restock_overflow_is_invalid_input() {
    let store = get_test_store().await;
    let p = store.insert_product(racket("OV-P", 100, 10)).await.unwrap();
    let buyer = store.insert_customer(customer("ov@example.com")).await.unwrap();
    let order = store
        .insert_order(new_order(buyer.id, vec![line(&p, 2)]))
        .await
        .unwrap();
    store.set_product_stock(p.id, i32::MAX).await.unwrap();

    let err = store.restore_stock(p.id, 1).await.unwrap_err();
    assert!(err.is(ErrorCode::ValidationInvalidInput));

    let err = store.cancel_order(order.order.id, None).await.unwrap_err();
    assert!(err.is(ErrorCode::ValidationInvalidInput));
    let details = store.get_order(order.order.id).await.unwrap().unwrap();
    assert_eq!(details.order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn set_status_stamps_shipped_at() {
    let store = get_test_store().await;
    let p = store.insert_product(racket("SH-P", 100, 10)).await.unwrap();
    let buyer = store.insert_customer(customer("sh@example.com")).await.unwrap();
    let order = store
        .insert_order(new_order(buyer.id, vec![line(&p, 1)]))
        .await
        .unwrap();

    let processing = store
        .set_order_status(order.order.id, OrderStatus::Pending, OrderStatus::Processing)
        .await
        .unwrap()
        .unwrap();
    assert!(processing.shipped_at.is_none());

    let shipped = store
        .set_order_status(order.order.id, OrderStatus::Processing, OrderStatus::Shipped)
        .await
        .unwrap()
        .unwrap();
    assert!(shipped.shipped_at.is_some());
}

#[tokio::test]
async fn list_orders_filters_and_stats() {
    let store = get_test_store().await;
    let p = store.insert_product(racket("LS-P", 100, 100)).await.unwrap();
    let q = store.insert_product(racket("LS-Q", 50, 100)).await.unwrap();
    let ana = store.insert_customer(customer("ana@example.com")).await.unwrap();
    let luis = store.insert_customer(customer("luis@example.com")).await.unwrap();

    let a = store.insert_order(new_order(ana.id, vec![line(&p, 1)])).await.unwrap();
    store.insert_order(new_order(luis.id, vec![line(&q, 2)])).await.unwrap();
    let c = store.insert_order(new_order(luis.id, vec![line(&p, 1)])).await.unwrap();
    store.cancel_order(c.order.id, None).await.unwrap();

    let by_email = OrderFilter {
        customer_email: Some("LUIS@example.com".to_string()),
        ..Default::default()
    };
    let page = store.list_orders(&by_email, PageRequest::default()).await.unwrap();
    assert_eq!(page.pagination.total, 2);
    assert!(page.data.iter().all(|d| d.customer.id == luis.id));

    let by_product = OrderFilter {
        product_id: Some(p.id),
        status: Some(OrderStatus::Pending),
        ..Default::default()
    };
    let page = store.list_orders(&by_product, PageRequest::default()).await.unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].order.id, a.order.id);

    let stats = store.order_stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.total_revenue, Money::from_units(119 + 119));
    assert_eq!(stats.average_order_value, Money::from_units(119));
}

#[tokio::test]
async fn historical_order_resolves_deleted_product() {
    let store = get_test_store().await;
    let p = store.insert_product(racket("HI-P", 100, 10)).await.unwrap();
    let buyer = store.insert_customer(customer("hi@example.com")).await.unwrap();
    let order = store
        .insert_order(new_order(buyer.id, vec![line(&p, 1)]))
        .await
        .unwrap();

    store.soft_delete_product(p.id).await.unwrap();

    let details = store.get_order(order.order.id).await.unwrap().unwrap();
    assert_eq!(details.items.len(), 1);
    assert!(details.items[0].product.is_deleted);
}

#[tokio::test]
async fn insert_order_item_reserves_stock() {
    let store = get_test_store().await;
    let p = store.insert_product(racket("IT-P", 100, 10)).await.unwrap();
    let buyer = store.insert_customer(customer("it@example.com")).await.unwrap();
    let order = store
        .insert_order(new_order(buyer.id, vec![line(&p, 1)]))
        .await
        .unwrap();

    let item = store
        .insert_order_item(NewOrderItem {
            order_id: order.order.id,
            line: line(&p, 4),
        })
        .await
        .unwrap();
    assert_eq!(item.quantity, 4);
    assert_eq!(store.get_product(p.id).await.unwrap().unwrap().quantity, 5);

    let err = store
        .insert_order_item(NewOrderItem {
            order_id: order.order.id,
            line: line(&p, 6),
        })
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::ProductInsufficientInventory));

    let items = store
        .list_order_items(
            &OrderItemFilter {
                order_id: Some(order.order.id),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(items.pagination.total, 2);
    assert_eq!(store.get_order_item(item.id).await.unwrap().unwrap(), item);
}
