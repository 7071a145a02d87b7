use std::collections::HashSet;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{quantity, units::Unit};
use crate::errors::{Result, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Recipe {
    pub recipe_id: Uuid,
    pub title: String,
    pub description: String,
    pub servings: i32,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A requirement line. `quantity` is relative to the recipe's own `servings`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct RecipeIngredient {
    pub recipe_ingredient_id: Uuid,
    pub recipe_id: Uuid,
    pub ingredient_id: Uuid,
    pub ingredient_name: String,
    #[sqlx(try_from = "String")]
    pub ingredient_default_unit: Unit,
    pub quantity: BigDecimal,
    #[sqlx(try_from = "String")]
    pub unit: Unit,
}

/// A requirement line as submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngredientLine {
    #[serde(alias = "ingredient")]
    pub ingredient_id: Uuid,
    #[serde(deserialize_with = "quantity::deserialize")]
    pub quantity: BigDecimal,
    pub unit: Unit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRecipe {
    pub title: String,
    pub description: String,
    pub servings: i32,
    pub image: Option<String>,
}

/// Field-wise changes for [`Recipe`]; `None` leaves a field untouched and
/// `image: Some(None)` clears the image reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub servings: Option<i32>,
    pub image: Option<Option<String>>,
}

impl NewRecipe {
    pub fn validate(mut self) -> Result<Self> {
        self.title = validate_title(&self.title)?;
        validate_servings(self.servings)?;
        Ok(self)
    }
}

impl RecipeChanges {
    /// Applies the changes on top of `recipe`, validating the result.
    pub fn apply_to(self, recipe: &mut Recipe) -> Result<()> {
        if let Some(title) = self.title {
            recipe.title = validate_title(&title)?;
        }
        if let Some(description) = self.description {
            recipe.description = description;
        }
        if let Some(servings) = self.servings {
            validate_servings(servings)?;
            recipe.servings = servings;
        }
        if let Some(image) = self.image {
            recipe.image = image;
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::validation("title", "title is required"));
    }
    Ok(title.to_string())
}

fn validate_servings(servings: i32) -> Result<()> {
    if servings < 1 {
        return Err(StoreError::validation(
            "servings",
            "servings must be a positive integer",
        ));
    }
    Ok(())
}

/// Validates a submitted line set: positive quantities within stored
/// precision and no repeated `(ingredient, unit)` pair. Quantities come back
/// normalised to two decimal places.
pub fn validate_lines(lines: Vec<IngredientLine>) -> Result<Vec<IngredientLine>> {
    let mut seen = HashSet::with_capacity(lines.len());

    lines
        .into_iter()
        .map(|line| {
            if !seen.insert((line.ingredient_id, line.unit)) {
                return Err(StoreError::Conflict(format!(
                    "ingredient {} listed twice in {}",
                    line.ingredient_id, line.unit
                )));
            }

            Ok(IngredientLine {
                quantity: quantity::fit_positive("ingredients", &line.quantity)?,
                ..line
            })
        })
        .collect()
}

const RECIPE_COLUMNS: &str = "
    recipe_id,
    title,
    description,
    servings,
    image,
    created_at,
    updated_at
";

impl Recipe {
    /// Creates a recipe together with its lines in one transaction. At least
    /// one line is required.
    #[tracing::instrument(skip(pool, lines), fields(lines = lines.len()), err)]
    pub async fn create(pool: &PgPool, recipe: NewRecipe, lines: Vec<IngredientLine>) -> Result<Self> {
        if lines.is_empty() {
            return Err(StoreError::validation(
                "ingredients",
                "at least one ingredient is required",
            ));
        }
        let recipe = recipe.validate()?;
        let lines = validate_lines(lines)?;

        let mut tx = pool.begin().await?;

        let created = sqlx::query_as::<_, Recipe>(&format!(
            "
            INSERT INTO recipes (recipe_id, title, description, servings, image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RECIPE_COLUMNS}
            "
        ))
        .bind(Uuid::new_v4())
        .bind(&recipe.title)
        .bind(&recipe.description)
        .bind(recipe.servings)
        .bind(&recipe.image)
        .fetch_one(&mut *tx)
        .await?;

        insert_lines(&mut tx, created.recipe_id, &lines).await?;

        tx.commit().await?;

        Ok(created)
    }

    pub async fn get_by_id(pool: &PgPool, recipe_id: Uuid) -> Result<Option<Self>> {
        let recipe = sqlx::query_as::<_, Recipe>(&format!(
            "
            SELECT {RECIPE_COLUMNS}
            FROM recipes
            WHERE recipe_id = $1
            "
        ))
        .bind(recipe_id)
        .fetch_optional(pool)
        .await?;

        Ok(recipe)
    }

    pub async fn get_many(pool: &PgPool, recipe_ids: &[Uuid]) -> Result<Vec<Self>> {
        let recipes = sqlx::query_as::<_, Recipe>(&format!(
            "
            SELECT {RECIPE_COLUMNS}
            FROM recipes
            WHERE recipe_id = ANY($1)
            "
        ))
        .bind(recipe_ids)
        .fetch_all(pool)
        .await?;

        Ok(recipes)
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let recipes = sqlx::query_as::<_, Recipe>(&format!(
            "
            SELECT {RECIPE_COLUMNS}
            FROM recipes
            ORDER BY title, recipe_id
            "
        ))
        .fetch_all(pool)
        .await?;

        Ok(recipes)
    }

    /// Updates scalar fields and, when `lines` is given, replaces the line set
    /// within the same transaction.
    #[tracing::instrument(skip(pool, changes, lines), err)]
    pub async fn update(
        pool: &PgPool,
        recipe_id: Uuid,
        changes: RecipeChanges,
        lines: Option<Vec<IngredientLine>>,
    ) -> Result<Self> {
        let lines = lines.map(validate_lines).transpose()?;

        let mut tx = pool.begin().await?;

        let mut recipe = lock(&mut tx, recipe_id).await?;
        changes.apply_to(&mut recipe)?;

        let updated = sqlx::query_as::<_, Recipe>(&format!(
            "
            UPDATE recipes
            SET title = $2,
                description = $3,
                servings = $4,
                image = $5,
                updated_at = NOW()
            WHERE recipe_id = $1
            RETURNING {RECIPE_COLUMNS}
            "
        ))
        .bind(recipe_id)
        .bind(&recipe.title)
        .bind(&recipe.description)
        .bind(recipe.servings)
        .bind(&recipe.image)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(lines) = lines {
            delete_lines(&mut tx, recipe_id).await?;
            insert_lines(&mut tx, recipe_id, &lines).await?;
        }

        tx.commit().await?;

        Ok(updated)
    }

    /// Atomically swaps the recipe's whole line set. An empty set clears the
    /// lines but keeps the recipe.
    #[tracing::instrument(skip(pool, lines), fields(lines = lines.len()), err)]
    pub async fn replace_ingredient_lines(
        pool: &PgPool,
        recipe_id: Uuid,
        lines: Vec<IngredientLine>,
    ) -> Result<()> {
        let lines = validate_lines(lines)?;

        let mut tx = pool.begin().await?;

        lock(&mut tx, recipe_id).await?;
        delete_lines(&mut tx, recipe_id).await?;
        insert_lines(&mut tx, recipe_id, &lines).await?;

        tx.commit().await?;

        Ok(())
    }

    /// Deletes a recipe, cascading explicitly to its lines and the meals
    /// planned with it.
    #[tracing::instrument(skip(pool), err)]
    pub async fn delete(pool: &PgPool, recipe_id: Uuid) -> Result<()> {
        let mut tx = pool.begin().await?;

        lock(&mut tx, recipe_id).await?;

        sqlx::query("DELETE FROM meals WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
        delete_lines(&mut tx, recipe_id).await?;
        sqlx::query("DELETE FROM recipes WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}

impl RecipeIngredient {
    pub async fn get_by_recipe(pool: &PgPool, recipe_id: Uuid) -> Result<Vec<Self>> {
        let lines = sqlx::query_as::<_, RecipeIngredient>(
            "
            SELECT
                ri.recipe_ingredient_id,
                ri.recipe_id,
                ri.ingredient_id,
                i.name AS ingredient_name,
                i.default_unit AS ingredient_default_unit,
                ri.quantity,
                ri.unit
            FROM recipe_ingredients ri
            JOIN ingredients i ON i.ingredient_id = ri.ingredient_id
            WHERE ri.recipe_id = $1
            ORDER BY ri.created_at, i.name
            ",
        )
        .bind(recipe_id)
        .fetch_all(pool)
        .await?;

        Ok(lines)
    }
}

async fn lock(tx: &mut Transaction<'_, Postgres>, recipe_id: Uuid) -> Result<Recipe> {
    sqlx::query_as::<_, Recipe>(&format!(
        "
        SELECT {RECIPE_COLUMNS}
        FROM recipes
        WHERE recipe_id = $1
        FOR UPDATE
        "
    ))
    .bind(recipe_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::not_found("recipe", recipe_id))
}

async fn delete_lines(tx: &mut Transaction<'_, Postgres>, recipe_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

async fn insert_lines(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    lines: &[IngredientLine],
) -> Result<()> {
    for line in lines {
        sqlx::query(
            "
            INSERT INTO recipe_ingredients (
                recipe_ingredient_id, recipe_id, ingredient_id, quantity, unit
            )
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(Uuid::new_v4())
        .bind(recipe_id)
        .bind(line.ingredient_id)
        .bind(&line.quantity)
        .bind(line.unit.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                StoreError::not_found("ingredient", line.ingredient_id)
            }
            _ => StoreError::from_write(err, || {
                format!(
                    "recipe {recipe_id} already lists ingredient {} in {}",
                    line.ingredient_id, line.unit
                )
            }),
        })?;
    }

    Ok(())
}
