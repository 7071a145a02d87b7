use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::recipe::Recipe;
use crate::errors::{Result, StoreError};

/// Inclusive calendar range. Construction guarantees `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(StoreError::validation(
                "start",
                format!("start {start} is after end {end}"),
            ));
        }
        Ok(Self { start, end })
    }

    /// Builds a range from optional bounds; both are required.
    pub fn from_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            (None, _) => Err(StoreError::validation("start", "start is required")),
            (_, None) => Err(StoreError::validation("end", "end is required")),
        }
    }

    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(self) -> NaiveDate {
        self.start
    }

    pub fn end(self) -> NaiveDate {
        self.end
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// A recipe planned for a calendar date. At most one per (date, recipe).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Meal {
    pub meal_id: Uuid,
    pub date: NaiveDate,
    pub recipe_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A meal resolved together with the recipe it references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedMeal {
    #[serde(flatten)]
    pub meal: Meal,
    pub recipe: Recipe,
}

impl Meal {
    #[tracing::instrument(skip(pool), err)]
    pub async fn create(pool: &PgPool, date: NaiveDate, recipe_id: Uuid) -> Result<Self> {
        if Recipe::get_by_id(pool, recipe_id).await?.is_none() {
            return Err(StoreError::not_found("recipe", recipe_id));
        }

        let meal = sqlx::query_as::<_, Meal>(
            "
            INSERT INTO meals (meal_id, date, recipe_id)
            VALUES ($1, $2, $3)
            RETURNING
                meal_id,
                date,
                recipe_id,
                created_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(date)
        .bind(recipe_id)
        .fetch_one(pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                StoreError::not_found("recipe", recipe_id)
            }
            _ => StoreError::from_write(err, || {
                format!("recipe {recipe_id} is already planned on {date}")
            }),
        })?;

        Ok(meal)
    }

    /// Lists meals ordered by date, optionally restricted to a range.
    pub async fn list(pool: &PgPool, range: Option<DateRange>) -> Result<Vec<Self>> {
        let meals = sqlx::query_as::<_, Meal>(
            "
            SELECT
                meal_id,
                date,
                recipe_id,
                created_at
            FROM meals
            WHERE ($1::DATE IS NULL OR date >= $1)
                AND ($2::DATE IS NULL OR date <= $2)
            ORDER BY date, created_at
            ",
        )
        .bind(range.map(DateRange::start))
        .bind(range.map(DateRange::end))
        .fetch_all(pool)
        .await?;

        Ok(meals)
    }

    /// Meals within `range`, each paired with its recipe.
    pub async fn get_by_date_range(pool: &PgPool, range: DateRange) -> Result<Vec<PlannedMeal>> {
        let meals = Self::list(pool, Some(range)).await?;

        let mut recipe_ids: Vec<Uuid> = meals.iter().map(|m| m.recipe_id).collect();
        recipe_ids.sort_unstable();
        recipe_ids.dedup();
        let recipes = Recipe::get_many(pool, &recipe_ids).await?;

        meals
            .into_iter()
            .map(|meal| {
                let recipe = recipes
                    .iter()
                    .find(|r| r.recipe_id == meal.recipe_id)
                    .cloned()
                    .ok_or_else(|| {
                        StoreError::Consistency(format!(
                            "meal {} references missing recipe {}",
                            meal.meal_id, meal.recipe_id
                        ))
                    })?;
                Ok(PlannedMeal { meal, recipe })
            })
            .collect()
    }

    pub async fn delete(pool: &PgPool, meal_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM meals WHERE meal_id = $1")
            .bind(meal_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("meal", meal_id));
        }

        Ok(())
    }
}
