//! Record listing and sync handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use gophkeeper_core::proto::{ItemInfo, ListRequest, ListResponse, SyncItemMessage};
use gophkeeper_core::DataItem;

use crate::auth::CallerId;
use crate::error::ServerError;
use crate::server::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(CallerId(user_id)): Extension<CallerId>,
    body: Result<Json<ListRequest>, JsonRejection>,
) -> Result<Json<ListResponse>, ServerError> {
    let Json(req) = body?;
    let query = req.into_query();

    let engine = state.engine.clone();
    let (items, total) = state
        .call(move |store| engine.list(store, user_id, &query))
        .await?;

    Ok(Json(ListResponse {
        items: items.into_iter().map(ItemInfo::from).collect(),
        total,
    }))
}

pub async fn sync_item(
    State(state): State<AppState>,
    Extension(CallerId(user_id)): Extension<CallerId>,
    body: Result<Json<SyncItemMessage>, JsonRejection>,
) -> Result<Json<SyncItemMessage>, ServerError> {
    let Json(req) = body?;
    let incoming = DataItem::from(req);

    let engine = state.engine.clone();
    let item = state
        .call(move |store| engine.sync_item(store, user_id, incoming))
        .await?;

    Ok(Json(item.into()))
}
