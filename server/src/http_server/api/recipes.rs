use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use db::{
    cooking::{
        IngredientLine, NewRecipe, Recipe, RecipeChanges, RecipeIngredient, RecipeStore as _,
        Store,
    },
    StoreError,
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{
    auth::WriteAccess,
    http_server::{extract::JsonBody, ResponseResult},
    AppState,
};

/// Requirement lines as submitted: an inline array, or that same array
/// encoded as a JSON string (as multipart forms send it).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub(crate) enum IngredientsField {
    Inline(Vec<IngredientLine>),
    Encoded(String),
}

impl IngredientsField {
    fn into_lines(self) -> Result<Vec<IngredientLine>, StoreError> {
        match self {
            IngredientsField::Inline(lines) => Ok(lines),
            IngredientsField::Encoded(raw) if raw.trim().is_empty() => Ok(vec![]),
            IngredientsField::Encoded(raw) => serde_json::from_str(&raw).map_err(|err| {
                StoreError::validation("ingredients", format!("invalid ingredient list: {err}"))
            }),
        }
    }
}

fn default_servings() -> i32 {
    1
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct CreateRecipeRequest {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_servings")]
    servings: i32,
    #[serde(default)]
    ingredients: Option<IngredientsField>,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct UpdateRecipeRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    servings: Option<i32>,
    #[serde(default)]
    ingredients: Option<IngredientsField>,
    #[serde(default, deserialize_with = "explicit_null")]
    image: Option<Option<String>>,
}

/// A recipe with its requirement lines.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RecipeDetail {
    #[serde(flatten)]
    recipe: Recipe,
    ingredients: Vec<RecipeIngredient>,
}

async fn detail(store: &dyn Store, recipe: Recipe) -> Result<RecipeDetail, StoreError> {
    let ingredients = store.get_ingredient_lines(recipe.recipe_id).await?;

    Ok(RecipeDetail {
        recipe,
        ingredients,
    })
}

#[axum_macros::debug_handler]
pub async fn list(State(state): State<AppState>) -> ResponseResult<impl IntoResponse> {
    let recipes = state.store.list_recipes().await?;

    let mut details = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        details.push(detail(&*state.store, recipe).await?);
    }

    Ok(Json(details))
}

#[axum_macros::debug_handler]
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ResponseResult<impl IntoResponse> {
    let recipe = state
        .store
        .get_recipe(id)
        .await?
        .ok_or_else(|| StoreError::not_found("recipe", id))?;

    Ok(Json(detail(&*state.store, recipe).await?))
}

#[axum_macros::debug_handler]
pub async fn create(
    _access: WriteAccess,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateRecipeRequest>,
) -> ResponseResult<impl IntoResponse> {
    let lines = payload
        .ingredients
        .map(IngredientsField::into_lines)
        .transpose()?
        .unwrap_or_default();

    let recipe = state
        .store
        .create_recipe(
            NewRecipe {
                title: payload.title,
                description: payload.description,
                servings: payload.servings,
                image: payload.image,
            },
            lines,
        )
        .await?;
    tracing::info!(recipe_id = %recipe.recipe_id, "Created recipe");

    Ok((
        StatusCode::CREATED,
        Json(detail(&*state.store, recipe).await?),
    ))
}

/// Updates the given fields. The line set is replaced only when
/// `ingredients` is present; an empty list clears it.
#[axum_macros::debug_handler]
pub async fn update(
    _access: WriteAccess,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<UpdateRecipeRequest>,
) -> ResponseResult<impl IntoResponse> {
    let lines = payload
        .ingredients
        .map(IngredientsField::into_lines)
        .transpose()?;

    let changes = RecipeChanges {
        title: payload.title,
        description: payload.description,
        servings: payload.servings,
        image: payload.image,
    };

    let recipe = state.store.update_recipe(id, changes, lines).await?;

    Ok(Json(detail(&*state.store, recipe).await?))
}

#[axum_macros::debug_handler]
pub async fn delete(
    _access: WriteAccess,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ResponseResult<impl IntoResponse> {
    state.store.delete_recipe(id).await?;
    tracing::info!(recipe_id = %id, "Deleted recipe");

    Ok(StatusCode::NO_CONTENT)
}
