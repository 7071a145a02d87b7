use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use sqlx::PgPool;
use std::fmt;
use uuid::Uuid;

use super::{ingredients::Ingredient, quantity, units::Unit};
use crate::errors::{Result, StoreError};

const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// How an upsert combines the submitted quantity with existing stock.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub enum UpsertMode {
    #[default]
    #[serde(rename = "add")]
    Add,
    #[serde(rename = "set")]
    Set,
}

impl fmt::Display for UpsertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertMode::Add => write!(f, "add"),
            UpsertMode::Set => write!(f, "set"),
        }
    }
}

impl std::str::FromStr for UpsertMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(UpsertMode::Add),
            "set" => Ok(UpsertMode::Set),
            _ => Err(format!("Unknown upsert mode: {s}")),
        }
    }
}

/// Case-insensitive; `null` means the default.
impl<'de> Deserialize<'de> for UpsertMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => raw.parse().map_err(de::Error::custom),
            None => Ok(Self::default()),
        }
    }
}

impl UpsertMode {
    /// Combines existing stock with a submitted quantity. Absent stock counts
    /// as zero, so a fresh key always ends up holding `submitted`.
    pub fn apply(self, existing: Option<&BigDecimal>, submitted: &BigDecimal) -> BigDecimal {
        match (self, existing) {
            (UpsertMode::Add, Some(existing)) => existing + submitted,
            _ => submitted.clone(),
        }
    }
}

/// Stock on hand for a single (ingredient, unit) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct PantryItem {
    pub pantry_item_id: Uuid,
    pub ingredient_id: Uuid,
    pub quantity: BigDecimal,
    #[sqlx(try_from = "String")]
    pub unit: Unit,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct UpsertedPantryItem {
    #[sqlx(flatten)]
    item: PantryItem,
    inserted: bool,
}

impl PantryItem {
    /// Creates or updates the stock row for `(ingredient_id, unit)` in a single
    /// statement, so concurrent `add` calls on one key serialise on the row
    /// lock instead of losing updates.
    #[tracing::instrument(skip(pool), err)]
    pub async fn upsert(
        pool: &PgPool,
        ingredient_id: Uuid,
        unit: Unit,
        quantity: &BigDecimal,
        mode: UpsertMode,
    ) -> Result<(Self, bool)> {
        let quantity = quantity::fit("quantity", quantity)?;

        if Ingredient::get_by_id(pool, ingredient_id).await?.is_none() {
            return Err(StoreError::not_found("ingredient", ingredient_id));
        }

        let row = sqlx::query_as::<_, UpsertedPantryItem>(
            "
            INSERT INTO pantry_items (pantry_item_id, ingredient_id, quantity, unit)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (ingredient_id, unit) DO UPDATE
            SET quantity = CASE
                    WHEN $5 THEN pantry_items.quantity + EXCLUDED.quantity
                    ELSE EXCLUDED.quantity
                END,
                updated_at = NOW()
            RETURNING
                pantry_item_id,
                ingredient_id,
                quantity,
                unit,
                created_at,
                updated_at,
                (xmax = 0) AS inserted
            ",
        )
        .bind(Uuid::new_v4())
        .bind(ingredient_id)
        .bind(&quantity)
        .bind(unit.as_str())
        .bind(mode == UpsertMode::Add)
        .fetch_one(pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                StoreError::not_found("ingredient", ingredient_id)
            }
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) => {
                quantity::too_large("quantity")
            }
            _ => StoreError::Database(err),
        })?;

        Ok((row.item, row.inserted))
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let items = sqlx::query_as::<_, PantryItem>(
            "
            SELECT
                p.pantry_item_id,
                p.ingredient_id,
                p.quantity,
                p.unit,
                p.created_at,
                p.updated_at
            FROM pantry_items p
            JOIN ingredients i ON i.ingredient_id = p.ingredient_id
            ORDER BY i.name, p.unit
            ",
        )
        .fetch_all(pool)
        .await?;

        Ok(items)
    }

    pub async fn delete(pool: &PgPool, pantry_item_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM pantry_items WHERE pantry_item_id = $1")
            .bind(pantry_item_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("pantry item", pantry_item_id));
        }

        Ok(())
    }
}
