//! `order.*` procedures.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::{CustomerId, OrderId, Page, PageRequest};
use domain::CreateOrder;
use serde::Deserialize;
use store::{Order, OrderChanges, OrderDetails, OrderFilter, OrderStats, OrderStatus, Store};

use super::{AppState, DeleteResponse, IdInput, ListInput, RpcInput, UpdateInput, checked};
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct OrderNumberInput {
    pub order_number: String,
}

#[derive(Debug, Deserialize)]
pub struct CustomerOrdersInput {
    pub customer_id: CustomerId,
    #[serde(flatten)]
    pub page: PageRequest,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusInput {
    pub id: OrderId,
    pub status: OrderStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelInput {
    pub id: OrderId,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /rpc/order.getById
pub async fn get_by_id<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<IdInput<OrderId>>,
) -> ApiResult<Json<OrderDetails>> {
    Ok(Json(state.orders.get_by_id(input.id).await?))
}

/// POST /rpc/order.getByOrderNumber
pub async fn get_by_order_number<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<OrderNumberInput>,
) -> ApiResult<Json<OrderDetails>> {
    Ok(Json(
        state.orders.get_by_order_number(&input.order_number).await?,
    ))
}

/// POST /rpc/order.getAll
pub async fn get_all<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<ListInput<OrderFilter>>,
) -> ApiResult<Json<Page<OrderDetails>>> {
    let page = checked(input.page)?;
    Ok(Json(state.orders.get_all(&input.filter, page).await?))
}

/// POST /rpc/order.getByCustomerId
pub async fn get_by_customer_id<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<CustomerOrdersInput>,
) -> ApiResult<Json<Page<OrderDetails>>> {
    let page = checked(input.page)?;
    Ok(Json(
        state
            .orders
            .get_by_customer_id(input.customer_id, page)
            .await?,
    ))
}

/// POST /rpc/order.getPending
pub async fn get_pending<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(page): RpcInput<PageRequest>,
) -> ApiResult<Json<Page<OrderDetails>>> {
    Ok(Json(state.orders.get_pending(checked(page)?).await?))
}

/// POST /rpc/order.create
#[tracing::instrument(skip(state, input))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<CreateOrder>,
) -> ApiResult<Json<OrderDetails>> {
    Ok(Json(state.orders.create(input).await?))
}

/// POST /rpc/order.update
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<UpdateInput<OrderId, OrderChanges>>,
) -> ApiResult<Json<OrderDetails>> {
    Ok(Json(state.orders.update(input.id, input.changes).await?))
}

/// POST /rpc/order.updateStatus
pub async fn update_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<UpdateStatusInput>,
) -> ApiResult<Json<Order>> {
    Ok(Json(
        state
            .orders
            .update_status(input.id, input.status, input.reason)
            .await?,
    ))
}

/// POST /rpc/order.cancel
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<CancelInput>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.orders.cancel(input.id, input.reason).await?))
}

/// POST /rpc/order.delete
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<IdInput<OrderId>>,
) -> ApiResult<Json<DeleteResponse>> {
    state.orders.delete(input.id).await?;
    Ok(DeleteResponse::ok())
}

/// POST /rpc/order.getStats
pub async fn get_stats<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Json<OrderStats>> {
    Ok(Json(state.orders.get_stats().await?))
}
