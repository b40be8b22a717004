//! HTTP API server for the order-management system.
//!
//! Exposes the product, order, order item and customer services as RPC
//! procedures (`POST /rpc/<router>.<procedure>`), with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{CustomerService, OrderItemService, OrderService, ProductService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::{AppState, customers, order_items, orders, products};

/// Creates the Axum application router with all procedures and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/rpc/product.getById", post(products::get_by_id::<S>))
        .route("/rpc/product.getAll", post(products::get_all::<S>))
        .route("/rpc/product.getActive", post(products::get_active::<S>))
        .route("/rpc/product.getByCategory", post(products::get_by_category::<S>))
        .route("/rpc/product.getLowStock", post(products::get_low_stock::<S>))
        .route("/rpc/product.create", post(products::create::<S>))
        .route("/rpc/product.update", post(products::update::<S>))
        .route("/rpc/product.updateStock", post(products::update_stock::<S>))
        .route("/rpc/product.reserveStock", post(products::reserve_stock::<S>))
        .route("/rpc/product.restoreStock", post(products::restore_stock::<S>))
        .route("/rpc/product.activate", post(products::activate::<S>))
        .route("/rpc/product.deactivate", post(products::deactivate::<S>))
        .route("/rpc/product.delete", post(products::delete::<S>))
        .route("/rpc/product.getStats", post(products::get_stats::<S>))
        .route("/rpc/order.getById", post(orders::get_by_id::<S>))
        .route("/rpc/order.getByOrderNumber", post(orders::get_by_order_number::<S>))
        .route("/rpc/order.getAll", post(orders::get_all::<S>))
        .route("/rpc/order.getByCustomerId", post(orders::get_by_customer_id::<S>))
        .route("/rpc/order.getPending", post(orders::get_pending::<S>))
        .route("/rpc/order.create", post(orders::create::<S>))
        .route("/rpc/order.update", post(orders::update::<S>))
        .route("/rpc/order.updateStatus", post(orders::update_status::<S>))
        .route("/rpc/order.cancel", post(orders::cancel::<S>))
        .route("/rpc/order.delete", post(orders::delete::<S>))
        .route("/rpc/order.getStats", post(orders::get_stats::<S>))
        .route("/rpc/orderItem.getById", post(order_items::get_by_id::<S>))
        .route("/rpc/orderItem.getAll", post(order_items::get_all::<S>))
        .route("/rpc/orderItem.create", post(order_items::create::<S>))
        .route("/rpc/customer.getById", post(customers::get_by_id::<S>))
        .route("/rpc/customer.getAll", post(customers::get_all::<S>))
        .route("/rpc/customer.create", post(customers::create::<S>))
        .route("/rpc/customer.update", post(customers::update::<S>))
        .route("/rpc/customer.delete", post(customers::delete::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds every service once over a shared store.
pub fn create_state<S: Store>(store: S, config: &Config) -> Arc<AppState<S>> {
    Arc::new(AppState {
        products: ProductService::new(store.clone())
            .with_low_stock_threshold(config.low_stock_threshold),
        customers: CustomerService::new(store.clone()),
        orders: OrderService::new(store.clone()),
        order_items: OrderItemService::new(store),
    })
}
