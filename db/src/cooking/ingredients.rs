use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::units::Unit;
use crate::errors::{Result, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Ingredient {
    pub ingredient_id: Uuid,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub default_unit: Unit,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct UpsertedIngredient {
    #[sqlx(flatten)]
    ingredient: Ingredient,
    inserted: bool,
}

/// Trims an ingredient name and rejects empty ones.
pub fn normalize_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::validation("name", "name is required"));
    }
    Ok(name)
}

impl Ingredient {
    /// Looks an ingredient up by name, creating it when absent. When it
    /// already exists and a different `default_unit` is supplied the stored
    /// unit is replaced. The flag is `true` when a row was inserted.
    #[tracing::instrument(skip(pool), err)]
    pub async fn find_or_create(
        pool: &PgPool,
        name: &str,
        default_unit: Option<Unit>,
    ) -> Result<(Self, bool)> {
        let name = normalize_name(name)?;

        let row = sqlx::query_as::<_, UpsertedIngredient>(
            "
            INSERT INTO ingredients (ingredient_id, name, default_unit)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
            SET default_unit = COALESCE($4, ingredients.default_unit),
                updated_at = NOW()
            RETURNING
                ingredient_id,
                name,
                default_unit,
                created_at,
                updated_at,
                (xmax = 0) AS inserted
            ",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(default_unit.unwrap_or_default().as_str())
        .bind(default_unit.map(Unit::as_str))
        .fetch_one(pool)
        .await?;

        Ok((row.ingredient, row.inserted))
    }

    pub async fn get_by_id(pool: &PgPool, ingredient_id: Uuid) -> Result<Option<Self>> {
        let ingredient = sqlx::query_as::<_, Ingredient>(
            "
            SELECT
                ingredient_id,
                name,
                default_unit,
                created_at,
                updated_at
            FROM ingredients
            WHERE ingredient_id = $1
            ",
        )
        .bind(ingredient_id)
        .fetch_optional(pool)
        .await?;

        Ok(ingredient)
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let ingredients = sqlx::query_as::<_, Ingredient>(
            "
            SELECT
                ingredient_id,
                name,
                default_unit,
                created_at,
                updated_at
            FROM ingredients
            ORDER BY name
            ",
        )
        .fetch_all(pool)
        .await?;

        Ok(ingredients)
    }

    /// Deletes an ingredient and its pantry stock. Refused while any recipe
    /// line still references it.
    #[tracing::instrument(skip(pool), err)]
    pub async fn delete(pool: &PgPool, ingredient_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM ingredients WHERE ingredient_id = $1")
            .bind(ingredient_id)
            .execute(pool)
            .await
            .map_err(|err| match &err {
                sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                    StoreError::Conflict(format!(
                        "ingredient {ingredient_id} is used by at least one recipe"
                    ))
                }
                _ => StoreError::Database(err),
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("ingredient", ingredient_id));
        }

        Ok(())
    }
}
