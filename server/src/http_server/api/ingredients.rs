use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use db::{
    cooking::{CatalogStore as _, Unit},
    StoreError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::WriteAccess,
    http_server::{extract::JsonBody, ResponseResult},
    AppState,
};

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct AddIngredientRequest {
    name: String,
    #[serde(default)]
    default_unit: Option<Unit>,
}

#[axum_macros::debug_handler]
pub async fn list(State(state): State<AppState>) -> ResponseResult<impl IntoResponse> {
    let ingredients = state.store.list_ingredients().await?;

    Ok(Json(ingredients))
}

#[axum_macros::debug_handler]
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ResponseResult<impl IntoResponse> {
    let ingredient = state
        .store
        .get_ingredient(id)
        .await?
        .ok_or_else(|| StoreError::not_found("ingredient", id))?;

    Ok(Json(ingredient))
}

/// Creates the ingredient, or returns the existing one with the same name.
/// 201 when created, 200 otherwise.
#[axum_macros::debug_handler]
pub async fn add(
    _access: WriteAccess,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<AddIngredientRequest>,
) -> ResponseResult<impl IntoResponse> {
    let (ingredient, created) = state
        .store
        .find_or_create_ingredient(&payload.name, payload.default_unit)
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(ingredient)))
}

#[axum_macros::debug_handler]
pub async fn delete(
    _access: WriteAccess,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ResponseResult<impl IntoResponse> {
    state.store.delete_ingredient(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
