//! `orderItem.*` procedures.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::{OrderItemId, Page};
use domain::CreateOrderItem;
use store::{OrderItem, OrderItemFilter, Store};

use super::{AppState, IdInput, ListInput, RpcInput, checked};
use crate::error::ApiResult;

/// POST /rpc/orderItem.getById
pub async fn get_by_id<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<IdInput<OrderItemId>>,
) -> ApiResult<Json<OrderItem>> {
    Ok(Json(state.order_items.get_by_id(input.id).await?))
}

/// POST /rpc/orderItem.getAll
pub async fn get_all<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<ListInput<OrderItemFilter>>,
) -> ApiResult<Json<Page<OrderItem>>> {
    let page = checked(input.page)?;
    Ok(Json(state.order_items.get_all(&input.filter, page).await?))
}

/// POST /rpc/orderItem.create
#[tracing::instrument(skip(state, input))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<CreateOrderItem>,
) -> ApiResult<Json<OrderItem>> {
    Ok(Json(state.order_items.create(input).await?))
}
