//! `product.*` procedures.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::{Page, PageRequest, ProductId};
use serde::Deserialize;
use store::{NewProduct, Product, ProductCategory, ProductChanges, ProductFilter, ProductStats, Store};

use super::{AppState, DeleteResponse, IdInput, ListInput, RpcInput, UpdateInput, checked};
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct QuantityInput {
    pub id: ProductId,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CategoryInput {
    pub category: ProductCategory,
    #[serde(flatten)]
    pub page: PageRequest,
}

#[derive(Debug, Deserialize)]
pub struct LowStockInput {
    #[serde(default)]
    pub threshold: Option<i32>,
    #[serde(flatten)]
    pub page: PageRequest,
}

/// POST /rpc/product.getById
pub async fn get_by_id<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<IdInput<ProductId>>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.products.find_by_id(input.id).await?))
}

/// POST /rpc/product.getAll
pub async fn get_all<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<ListInput<ProductFilter>>,
) -> ApiResult<Json<Page<Product>>> {
    let page = checked(input.page)?;
    Ok(Json(state.products.find_many(&input.filter, page).await?))
}

/// POST /rpc/product.getActive
pub async fn get_active<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(page): RpcInput<PageRequest>,
) -> ApiResult<Json<Page<Product>>> {
    Ok(Json(state.products.get_active(checked(page)?).await?))
}

/// POST /rpc/product.getByCategory
pub async fn get_by_category<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<CategoryInput>,
) -> ApiResult<Json<Page<Product>>> {
    let page = checked(input.page)?;
    Ok(Json(
        state.products.get_by_category(input.category, page).await?,
    ))
}

/// POST /rpc/product.getLowStock
pub async fn get_low_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<LowStockInput>,
) -> ApiResult<Json<Page<Product>>> {
    let page = checked(input.page)?;
    Ok(Json(
        state.products.get_low_stock(input.threshold, page).await?,
    ))
}

/// POST /rpc/product.create
#[tracing::instrument(skip(state, input))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<NewProduct>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.products.create(input).await?))
}

/// POST /rpc/product.update
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<UpdateInput<ProductId, ProductChanges>>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.products.update(input.id, input.changes).await?))
}

/// POST /rpc/product.updateStock
pub async fn update_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<QuantityInput>,
) -> ApiResult<Json<Product>> {
    Ok(Json(
        state.products.update_stock(input.id, input.quantity).await?,
    ))
}

/// POST /rpc/product.reserveStock
pub async fn reserve_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<QuantityInput>,
) -> ApiResult<Json<Product>> {
    Ok(Json(
        state.products.reserve_stock(input.id, input.quantity).await?,
    ))
}

/// POST /rpc/product.restoreStock
pub async fn restore_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<QuantityInput>,
) -> ApiResult<Json<Product>> {
    Ok(Json(
        state.products.restore_stock(input.id, input.quantity).await?,
    ))
}

/// POST /rpc/product.activate
pub async fn activate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<IdInput<ProductId>>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.products.activate(input.id).await?))
}

/// POST /rpc/product.deactivate
pub async fn deactivate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<IdInput<ProductId>>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.products.deactivate(input.id).await?))
}

/// POST /rpc/product.delete
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    RpcInput(input): RpcInput<IdInput<ProductId>>,
) -> ApiResult<Json<DeleteResponse>> {
    state.products.delete(input.id).await?;
    Ok(DeleteResponse::ok())
}

/// POST /rpc/product.getStats
pub async fn get_stats<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Json<ProductStats>> {
    Ok(Json(state.products.get_stats().await?))
}
