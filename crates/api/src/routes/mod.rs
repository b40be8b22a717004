//! RPC procedures, grouped by router.
//!
//! Every procedure is served at `POST /rpc/<router>.<procedure>` and takes its
//! input as a JSON body.

pub mod customers;
pub mod health;
pub mod metrics;
pub mod order_items;
pub mod orders;
pub mod products;

use axum::Json;
use axum::extract::{FromRequest, Request};
use common::{AppResult, MAX_PAGE_LIMIT, PageRequest};
use domain::{CustomerService, OrderItemService, OrderService, ProductService};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use store::Store;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub products: ProductService<S>,
    pub customers: CustomerService<S>,
    pub orders: OrderService<S>,
    pub order_items: OrderItemService<S>,
}

/// JSON body extractor whose rejections use the API error format.
pub struct RpcInput<T>(pub T);

impl<T, S> FromRequest<S> for RpcInput<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(RpcInput(value))
    }
}

/// `{ "id": ... }`
#[derive(Debug, Deserialize)]
pub struct IdInput<I> {
    pub id: I,
}

/// A list procedure's filter plus page request, flattened into one object.
#[derive(Debug, Deserialize)]
pub struct ListInput<F> {
    #[serde(flatten)]
    pub filter: F,
    #[serde(flatten)]
    pub page: PageRequest,
}

/// `{ "id": ..., <changes> }`
#[derive(Debug, Deserialize)]
pub struct UpdateInput<I, C> {
    pub id: I,
    #[serde(flatten)]
    pub changes: C,
}

/// Response for soft deletes.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

impl DeleteResponse {
    pub(crate) fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

/// Rejects pages outside `1..` and limits outside `1..=100`.
pub(crate) fn checked(page: PageRequest) -> AppResult<PageRequest> {
    page.validate(MAX_PAGE_LIMIT)?;
    Ok(page)
}
