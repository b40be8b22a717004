//! `customer.*` procedures.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::{CustomerId, Page};
use store::{Customer, CustomerChanges, CustomerFilter, NewCustomer, Store};

use super::{AppState, DeleteResponse, IdInput, ListInput, RpcInput, UpdateInput, checked};
use crate::error::ApiResult;

/// POST /rpc/customer.getById
pub async fn get_by_id<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<IdInput<CustomerId>>,
) -> ApiResult<Json<Customer>> {
    Ok(Json(state.customers.get_by_id(input.id).await?))
}

/// POST /rpc/customer.getAll
pub async fn get_all<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<ListInput<CustomerFilter>>,
) -> ApiResult<Json<Page<Customer>>> {
    let page = checked(input.page)?;
    Ok(Json(state.customers.get_all(&input.filter, page).await?))
}

/// POST /rpc/customer.create
#[tracing::instrument(skip(state, input))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<NewCustomer>,
) -> ApiResult<Json<Customer>> {
    Ok(Json(state.customers.create(input).await?))
}

/// POST /rpc/customer.update
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<UpdateInput<CustomerId, CustomerChanges>>,
) -> ApiResult<Json<Customer>> {
    Ok(Json(state.customers.update(input.id, input.changes).await?))
}

/// POST /rpc/customer.delete
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<IdInput<CustomerId>>,
) -> ApiResult<Json<DeleteResponse>> {
    state.customers.delete(input.id).await?;
    Ok(DeleteResponse::ok())
}
