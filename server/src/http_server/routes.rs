use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::api::{ingredients, meals, pantry, recipes};
use crate::AppState;

pub(crate) fn make_router() -> Router<AppState> {
    Router::new()
        .route(
            "/_health",
            get(|| async {
                Json(json!({
                    "status": "ok",
                    "version": env!("CARGO_PKG_VERSION"),
                }))
            }),
        )
        .route("/ingredients", get(ingredients::list))
        .route("/ingredients/add", post(ingredients::add))
        .route(
            "/ingredients/{id}",
            get(ingredients::get).delete(ingredients::delete),
        )
        .route("/pantry", get(pantry::list))
        .route("/pantry/upsert", post(pantry::upsert))
        .route("/pantry/{id}", axum::routing::delete(pantry::delete))
        .route("/recipes", get(recipes::list).post(recipes::create))
        .route(
            "/recipes/{id}",
            get(recipes::get)
                .put(recipes::update)
                .patch(recipes::update)
                .delete(recipes::delete),
        )
        .route("/meals", get(meals::list).post(meals::create))
        .route("/meals/shopping_list", get(meals::shopping_list))
        .route("/meals/{id}", axum::routing::delete(meals::delete))
}
