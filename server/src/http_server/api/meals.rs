use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use db::{
    cooking::{
        compute_shortfall, DateRange, PlannedMeal, PlannerStore as _, RecipeStore as _,
        ScaleFactor, ShortfallRow,
    },
    StoreError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::WriteAccess,
    http_server::{
        extract::{JsonBody, QueryParams},
        ResponseResult,
    },
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RangeQuery {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ShoppingListQuery {
    start: Option<String>,
    end: Option<String>,
    servings: Option<String>,
}

/// Blank counts as absent.
fn date_param(field: &'static str, raw: Option<&str>) -> Result<Option<NaiveDate>, StoreError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| StoreError::validation(field, format!("'{raw}' is not a YYYY-MM-DD date"))),
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct CreateMealRequest {
    date: NaiveDate,
    #[serde(alias = "recipe_id")]
    recipe: Uuid,
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct ShoppingList {
    missing: Vec<ShortfallRow>,
}

/// Lists meals by date. The range filter applies only when both `start` and
/// `end` are given.
#[axum_macros::debug_handler]
pub async fn list(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<RangeQuery>,
) -> ResponseResult<impl IntoResponse> {
    let start = date_param("start", query.start.as_deref())?;
    let end = date_param("end", query.end.as_deref())?;
    let range = match (start, end) {
        (Some(start), Some(end)) => Some(DateRange::new(start, end)?),
        _ => None,
    };

    let meals = state.store.list_meals(range).await?;

    Ok(Json(meals))
}

#[axum_macros::debug_handler]
pub async fn create(
    _access: WriteAccess,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateMealRequest>,
) -> ResponseResult<impl IntoResponse> {
    let meal = state.store.create_meal(payload.date, payload.recipe).await?;
    let recipe = state
        .store
        .get_recipe(meal.recipe_id)
        .await?
        .ok_or_else(|| StoreError::not_found("recipe", meal.recipe_id))?;

    Ok((StatusCode::CREATED, Json(PlannedMeal { meal, recipe })))
}

#[axum_macros::debug_handler]
pub async fn delete(
    _access: WriteAccess,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ResponseResult<impl IntoResponse> {
    state.store.delete_meal(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// What must be bought to cook every meal between `start` and `end`,
/// inclusive, with every recipe quantity multiplied by `servings`.
#[axum_macros::debug_handler]
pub async fn shopping_list(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ShoppingListQuery>,
) -> ResponseResult<impl IntoResponse> {
    let range = DateRange::from_bounds(
        date_param("start", query.start.as_deref())?,
        date_param("end", query.end.as_deref())?,
    )?;
    let scale = match query.servings.as_deref() {
        Some(raw) if !raw.trim().is_empty() => raw.parse::<ScaleFactor>()?,
        _ => ScaleFactor::default(),
    };

    let missing = compute_shortfall(&*state.store, range, &scale).await?;

    Ok(Json(ShoppingList { missing }))
}

#[cfg(test)]
mod tests {
    use axum::http::{header, Method, StatusCode};
    use db::{
        cooking::{Meal, PlannerStore as _, Unit},
        test_utils::{date, ingredient, recipe, stock},
    };
    use serde_json::json;
    use tower::ServiceExt as _;

    use super::ShoppingList;
    use crate::http_server::{errors::ErrorBody, test_helpers::*};

    #[tokio::test]
    async fn test_shopping_list_soup_scenario() {
        let (app, store) = test_app();
        let carrot = ingredient(&*store, "carrot").await;
        let soup = recipe(&*store, "Soup", &[(&carrot, "200", Unit::Grams)]).await;
        store
            .create_meal(date("2024-01-01"), soup.recipe_id)
            .await
            .unwrap();
        stock(&*store, &carrot, "50", Unit::Grams).await;

        let response = app
            .oneshot(empty_request(
                Method::GET,
                "/meals/shopping_list?start=2024-01-01&end=2024-01-01&servings=1",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = response_body_json(response).await;
        assert_eq!(
            body,
            json!({
                "missing": [{
                    "ingredient_id": carrot.ingredient_id,
                    "ingredient_name": "carrot",
                    "quantity_needed": "150.00",
                    "unit": "g",
                }]
            })
        );
    }

    #[tokio::test]
    async fn test_shopping_list_scales() {
        let (app, store) = test_app();
        let carrot = ingredient(&*store, "carrot").await;
        let soup = recipe(&*store, "Soup", &[(&carrot, "200", Unit::Grams)]).await;
        store
            .create_meal(date("2024-01-01"), soup.recipe_id)
            .await
            .unwrap();

        let response = app
            .oneshot(empty_request(
                Method::GET,
                "/meals/shopping_list?start=2024-01-01&end=2024-01-07&servings=1.5",
            ))
            .await
            .unwrap();

        let list: ShoppingList = response_body_json(response).await;
        assert_eq!(list.missing.len(), 1);
        assert_eq!(list.missing[0].quantity_needed.to_string(), "300.00");
    }

    #[tokio::test]
    async fn test_shopping_list_requires_both_bounds() {
        let (app, _) = test_app();

        for uri in [
            "/meals/shopping_list",
            "/meals/shopping_list?start=2024-01-01",
            "/meals/shopping_list?end=2024-01-01",
        ] {
            let response = app
                .clone()
                .oneshot(empty_request(Method::GET, uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_shopping_list_rejects_inverted_range_and_bad_scale() {
        let (app, _) = test_app();

        let response = app
            .clone()
            .oneshot(empty_request(
                Method::GET,
                "/meals/shopping_list?start=2024-01-02&end=2024-01-01",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(empty_request(
                Method::GET,
                "/meals/shopping_list?start=2024-01-01&end=2024-01-01&servings=0",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorBody = response_body_json(response).await;
        assert_eq!(error.field.as_deref(), Some("servings"));
    }

    #[tokio::test]
    async fn test_shopping_list_rejects_malformed_dates() {
        let (app, _) = test_app();

        for (uri, field) in [
            ("/meals/shopping_list?start=2024-13-01&end=2024-01-01", "start"),
            ("/meals/shopping_list?start=2024-01-01&end=soon", "end"),
            ("/meals?start=2024-02-30&end=2024-03-01", "start"),
        ] {
            let response = app
                .clone()
                .oneshot(empty_request(Method::GET, uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "application/json",
                "{uri}"
            );
            let error: ErrorBody = response_body_json(response).await;
            assert_eq!(error.field.as_deref(), Some(field), "{uri}");
        }
    }

    #[tokio::test]
    async fn test_malformed_query_string_gets_error_body() {
        let (app, _) = test_app();

        let response = app
            .oneshot(empty_request(
                Method::GET,
                "/meals/shopping_list?start=2024-01-01&start=2024-01-02&end=2024-01-03",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let error: ErrorBody = response_body_json(response).await;
        assert!(error.detail.contains("start"), "{}", error.detail);
    }

    #[tokio::test]
    async fn test_shopping_list_rejects_huge_scale() {
        let (app, _) = test_app();

        let response = app
            .oneshot(empty_request(
                Method::GET,
                "/meals/shopping_list?start=2024-01-01&end=2024-01-01&servings=1e2000000",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorBody = response_body_json(response).await;
        assert_eq!(error.field.as_deref(), Some("servings"));
    }

    #[tokio::test]
    async fn test_create_meal_and_double_booking() {
        let (app, store) = test_app();
        let carrot = ingredient(&*store, "carrot").await;
        let soup = recipe(&*store, "Soup", &[(&carrot, "200", Unit::Grams)]).await;
        let body = json!({"date": "2024-01-01", "recipe": soup.recipe_id});

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/meals", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: serde_json::Value = response_body_json(response).await;
        assert_eq!(created["recipe"]["title"], "Soup");

        let response = app
            .oneshot(json_request(Method::POST, "/meals", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_create_meal_unknown_recipe() {
        let (app, _) = test_app();

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/meals",
                &json!({"date": "2024-01-01", "recipe": uuid::Uuid::new_v4()}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_filters_only_with_both_bounds() {
        let (app, store) = test_app();
        let carrot = ingredient(&*store, "carrot").await;
        let soup = recipe(&*store, "Soup", &[(&carrot, "200", Unit::Grams)]).await;
        for day in ["2024-01-01", "2024-01-05", "2024-02-01"] {
            store.create_meal(date(day), soup.recipe_id).await.unwrap();
        }

        let response = app
            .clone()
            .oneshot(empty_request(
                Method::GET,
                "/meals?start=2024-01-01&end=2024-01-31",
            ))
            .await
            .unwrap();
        let meals: Vec<Meal> = response_body_json(response).await;
        assert_eq!(meals.len(), 2);

        let response = app
            .oneshot(empty_request(Method::GET, "/meals?start=2024-01-02"))
            .await
            .unwrap();
        let meals: Vec<Meal> = response_body_json(response).await;
        assert_eq!(meals.len(), 3);
        assert_eq!(meals[0].date, date("2024-01-01"));
    }

    #[tokio::test]
    async fn test_delete_unknown_meal() {
        let (app, _) = test_app();

        let response = app
            .oneshot(empty_request(
                Method::DELETE,
                &format!("/meals/{}", uuid::Uuid::new_v4()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
