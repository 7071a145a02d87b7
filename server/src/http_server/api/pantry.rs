use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use db::{
    cooking::{quantity, CatalogStore as _, Ingredient, PantryItem, Unit, UpsertMode},
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
pub(crate) struct UpsertPantryRequest {
    #[serde(alias = "ingredient_id")]
    ingredient: Uuid,
    #[serde(deserialize_with = "quantity::deserialize")]
    quantity: BigDecimal,
    unit: Unit,
    #[serde(default)]
    mode: UpsertMode,
}

/// A pantry row together with the ingredient it stocks.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PantryEntry {
    #[serde(flatten)]
    item: PantryItem,
    ingredient_detail: Ingredient,
}

#[axum_macros::debug_handler]
pub async fn list(State(state): State<AppState>) -> ResponseResult<impl IntoResponse> {
    let items = state.store.list_pantry().await?;
    let ingredients: HashMap<Uuid, Ingredient> = state
        .store
        .list_ingredients()
        .await?
        .into_iter()
        .map(|i| (i.ingredient_id, i))
        .collect();

    let entries = items
        .into_iter()
        .map(|item| {
            let ingredient_detail = ingredients
                .get(&item.ingredient_id)
                .cloned()
                .ok_or_else(|| {
                    StoreError::Consistency(format!(
                        "pantry item {} references missing ingredient {}",
                        item.pantry_item_id, item.ingredient_id
                    ))
                })?;
            Ok(PantryEntry {
                item,
                ingredient_detail,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(Json(entries))
}

/// Adds to or overwrites the stock for `(ingredient, unit)`. 201 when a new
/// row was created, 200 when an existing one changed.
#[axum_macros::debug_handler]
pub async fn upsert(
    _access: WriteAccess,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<UpsertPantryRequest>,
) -> ResponseResult<impl IntoResponse> {
    let (item, created) = state
        .store
        .upsert_pantry_quantity(
            payload.ingredient,
            payload.unit,
            payload.quantity,
            payload.mode,
        )
        .await?;

    let ingredient_detail = state
        .store
        .get_ingredient(item.ingredient_id)
        .await?
        .ok_or_else(|| StoreError::not_found("ingredient", item.ingredient_id))?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(PantryEntry {
            item,
            ingredient_detail,
        }),
    ))
}

#[axum_macros::debug_handler]
pub async fn delete(
    _access: WriteAccess,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ResponseResult<impl IntoResponse> {
    state.store.delete_pantry_item(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
