//! Shortfall report: what must be bought to cook every meal in a date range.
//!
//! Needs are bucketed by `(ingredient, unit)` without any unit conversion,
//! pantry stock is subtracted only from keys that are actually needed, and
//! only strictly positive remainders are reported.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    meal_planning::DateRange,
    pantry::PantryItem,
    store::{CatalogStore, PlannerStore, RecipeStore, Store},
    units::Unit,
};
use crate::errors::{Result, StoreError};

const REPORT_SCALE: i64 = 2;
const MAX_FACTOR_INTEGER_DIGITS: i64 = 4;
const MAX_FACTOR_SCALE: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NeedKey {
    pub ingredient_id: Uuid,
    pub unit: Unit,
}

impl NeedKey {
    pub fn new(ingredient_id: Uuid, unit: Unit) -> Self {
        Self {
            ingredient_id,
            unit,
        }
    }
}

/// Signed running totals per need key. Absent keys read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeedLedger {
    needs: HashMap<NeedKey, BigDecimal>,
}

impl NeedLedger {
    pub fn add_need(&mut self, key: NeedKey, quantity: &BigDecimal) {
        *self.needs.entry(key).or_insert_with(BigDecimal::zero) += quantity;
    }

    /// Subtracts stock from an existing key. Stock for a key nothing needs is
    /// ignored.
    pub fn subtract_stock(&mut self, key: NeedKey, quantity: &BigDecimal) {
        if let Some(need) = self.needs.get_mut(&key) {
            *need -= quantity;
        }
    }

    pub fn get(&self, key: NeedKey) -> BigDecimal {
        self.needs.get(&key).cloned().unwrap_or_else(BigDecimal::zero)
    }

    pub fn len(&self) -> usize {
        self.needs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.needs.is_empty()
    }

    /// Keys whose remaining need is strictly positive.
    pub fn shortfalls(&self) -> impl Iterator<Item = (NeedKey, &BigDecimal)> + '_ {
        let zero = BigDecimal::zero();
        self.needs
            .iter()
            .filter(move |(_, need)| **need > zero)
            .map(|(key, need)| (*key, need))
    }
}

/// Flat multiplier applied to every requirement line, regardless of the
/// recipe's own `servings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleFactor(BigDecimal);

impl ScaleFactor {
    /// Accepts positive factors below 10000 with at most four decimal places.
    pub fn new(factor: BigDecimal) -> Result<Self> {
        let normalized = factor.normalized();
        let (_, scale) = normalized.as_bigint_and_exponent();
        let integer_digits = i64::try_from(normalized.digits())
            .unwrap_or(i64::MAX)
            .saturating_sub(scale);

        if integer_digits > MAX_FACTOR_INTEGER_DIGITS {
            return Err(StoreError::validation(
                "servings",
                "scale factor must be below 10000",
            ));
        }
        if scale > MAX_FACTOR_SCALE {
            return Err(StoreError::validation(
                "servings",
                format!("scale factor may have at most {MAX_FACTOR_SCALE} decimal places"),
            ));
        }
        if factor <= BigDecimal::zero() {
            return Err(StoreError::validation(
                "servings",
                format!("scale factor must be positive, got {factor}"),
            ));
        }
        Ok(Self(factor))
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self(BigDecimal::from(1))
    }
}

impl FromStr for ScaleFactor {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let factor = BigDecimal::from_str(s.trim()).map_err(|_| {
            StoreError::validation("servings", format!("invalid scale factor: {s}"))
        })?;
        Self::new(factor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShortfallRow {
    pub ingredient_id: Uuid,
    pub ingredient_name: String,
    pub quantity_needed: BigDecimal,
    pub unit: Unit,
}

/// Sums the scaled requirement lines of every meal in `range`. Each distinct
/// recipe's lines are read once, however many times it is planned.
#[tracing::instrument(skip(store), err)]
pub async fn accumulate_needs<S>(
    store: &S,
    range: DateRange,
    scale: &ScaleFactor,
) -> Result<NeedLedger>
where
    S: RecipeStore + PlannerStore + ?Sized,
{
    let meals = store.list_meals_in_range(range).await?;
    tracing::debug!(meals = meals.len(), "Collected planned meals");

    let mut lines_by_recipe = HashMap::new();
    for planned in &meals {
        let recipe_id = planned.recipe.recipe_id;
        if !lines_by_recipe.contains_key(&recipe_id) {
            let lines = store.get_ingredient_lines(recipe_id).await?;
            lines_by_recipe.insert(recipe_id, lines);
        }
    }

    let mut ledger = NeedLedger::default();
    for planned in &meals {
        let Some(lines) = lines_by_recipe.get(&planned.recipe.recipe_id) else {
            continue;
        };
        for line in lines {
            let need = &line.quantity * scale.as_decimal();
            ledger.add_need(NeedKey::new(line.ingredient_id, line.unit), &need);
        }
    }

    Ok(ledger)
}

/// Nets pantry stock off the ledger.
pub fn subtract_pantry(ledger: &mut NeedLedger, pantry: &[PantryItem]) {
    for item in pantry {
        ledger.subtract_stock(NeedKey::new(item.ingredient_id, item.unit), &item.quantity);
    }
}

/// Builds the shortfall report for `range`, sorted by ingredient name then
/// unit. Quantities are rounded half-up to two decimal places after the
/// positive filter.
#[tracing::instrument(skip(store), err)]
pub async fn compute_shortfall<S>(
    store: &S,
    range: DateRange,
    scale: &ScaleFactor,
) -> Result<Vec<ShortfallRow>>
where
    S: Store + ?Sized,
{
    let mut ledger = accumulate_needs(store, range, scale).await?;

    let pantry = store.list_pantry().await?;
    subtract_pantry(&mut ledger, &pantry);

    let short: Vec<_> = ledger.shortfalls().collect();
    if short.is_empty() {
        return Ok(vec![]);
    }

    let wanted: HashSet<Uuid> = short.iter().map(|(key, _)| key.ingredient_id).collect();
    let names: HashMap<Uuid, String> = store
        .list_ingredients()
        .await?
        .into_iter()
        .filter(|i| wanted.contains(&i.ingredient_id))
        .map(|i| (i.ingredient_id, i.name))
        .collect();

    let mut rows = short
        .into_iter()
        .map(|(key, need)| {
            let Some(name) = names.get(&key.ingredient_id) else {
                tracing::error!(
                    ingredient_id = %key.ingredient_id,
                    unit = %key.unit,
                    "Needed ingredient vanished while building shopping list"
                );
                return Err(StoreError::Consistency(format!(
                    "ingredient {} is needed but no longer exists",
                    key.ingredient_id
                )));
            };

            Ok(ShortfallRow {
                ingredient_id: key.ingredient_id,
                ingredient_name: name.clone(),
                quantity_needed: need
                    .with_scale_round(REPORT_SCALE, RoundingMode::HalfUp)
                    .with_scale(REPORT_SCALE),
                unit: key.unit,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    rows.sort_by(|a, b| {
        a.ingredient_name
            .cmp(&b.ingredient_name)
            .then(a.unit.as_str().cmp(b.unit.as_str()))
    });
    tracing::info!(rows = rows.len(), "Computed shopping list");

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooking::{
        memory::MemoryStore,
        pantry::UpsertMode,
        store::{CatalogStore, PlannerStore},
    };
    use crate::test_utils::{date, dec, ingredient, recipe, stock};

    fn day(s: &str) -> DateRange {
        DateRange::single_day(date(s))
    }

    fn quantities(rows: &[ShortfallRow]) -> Vec<(String, String, Unit)> {
        rows.iter()
            .map(|r| {
                (
                    r.ingredient_name.clone(),
                    r.quantity_needed.to_string(),
                    r.unit,
                )
            })
            .collect()
    }

    #[test]
    fn test_ledger_ignores_stock_for_unneeded_keys() {
        let carrot = NeedKey::new(Uuid::new_v4(), Unit::Grams);
        let onion = NeedKey::new(Uuid::new_v4(), Unit::Pieces);

        let mut ledger = NeedLedger::default();
        ledger.add_need(carrot, &dec("200"));
        ledger.subtract_stock(onion, &dec("5"));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(onion), BigDecimal::zero());
    }

    #[test]
    fn test_ledger_shortfalls_are_strictly_positive() {
        let exact = NeedKey::new(Uuid::new_v4(), Unit::Grams);
        let surplus = NeedKey::new(Uuid::new_v4(), Unit::Grams);
        let short = NeedKey::new(Uuid::new_v4(), Unit::Grams);

        let mut ledger = NeedLedger::default();
        for key in [exact, surplus, short] {
            ledger.add_need(key, &dec("100"));
        }
        ledger.subtract_stock(exact, &dec("100"));
        ledger.subtract_stock(surplus, &dec("150"));
        ledger.subtract_stock(short, &dec("0.01"));

        let keys: Vec<_> = ledger.shortfalls().map(|(key, _)| key).collect();
        assert_eq!(keys, vec![short]);
    }

    #[test]
    fn test_scale_factor_parsing() {
        assert_eq!(ScaleFactor::default().as_decimal(), &dec("1"));
        assert_eq!(
            "2.5".parse::<ScaleFactor>().unwrap().as_decimal(),
            &dec("2.5")
        );
        assert!(matches!(
            "0".parse::<ScaleFactor>(),
            Err(StoreError::Validation { field: "servings", .. })
        ));
        assert!("-1".parse::<ScaleFactor>().is_err());
        assert!("lots".parse::<ScaleFactor>().is_err());
    }

    #[test]
    fn test_scale_factor_is_bounded() {
        assert_eq!(
            "9999.9999".parse::<ScaleFactor>().unwrap().as_decimal(),
            &dec("9999.9999")
        );
        for raw in ["10000", "1e2000000", "0.00001", "1e-2000000"] {
            assert!(
                matches!(
                    raw.parse::<ScaleFactor>(),
                    Err(StoreError::Validation { field: "servings", .. })
                ),
                "{raw}"
            );
        }
    }

    #[tokio::test]
    async fn test_soup_with_some_carrots_on_hand() {
        let store = MemoryStore::new();
        let carrot = ingredient(&store, "carrot").await;
        let soup = recipe(&store, "Soup", &[(&carrot, "200", Unit::Grams)]).await;
        store.create_meal(date("2024-01-01"), soup.recipe_id).await.unwrap();
        stock(&store, &carrot, "50", Unit::Grams).await;

        let rows = compute_shortfall(&store, day("2024-01-01"), &ScaleFactor::default())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ingredient_id, carrot.ingredient_id);
        assert_eq!(
            quantities(&rows),
            vec![("carrot".to_string(), "150.00".to_string(), Unit::Grams)]
        );
    }

    #[tokio::test]
    async fn test_soup_with_enough_carrots_on_hand() {
        let store = MemoryStore::new();
        let carrot = ingredient(&store, "carrot").await;
        let soup = recipe(&store, "Soup", &[(&carrot, "200", Unit::Grams)]).await;
        store.create_meal(date("2024-01-01"), soup.recipe_id).await.unwrap();
        stock(&store, &carrot, "250", Unit::Grams).await;

        let rows = compute_shortfall(&store, day("2024-01-01"), &ScaleFactor::default())
            .await
            .unwrap();

        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_exact_stock_is_not_reported() {
        let store = MemoryStore::new();
        let carrot = ingredient(&store, "carrot").await;
        let soup = recipe(&store, "Soup", &[(&carrot, "200", Unit::Grams)]).await;
        store.create_meal(date("2024-01-01"), soup.recipe_id).await.unwrap();
        stock(&store, &carrot, "200", Unit::Grams).await;

        let rows = compute_shortfall(&store, day("2024-01-01"), &ScaleFactor::default())
            .await
            .unwrap();

        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_range_excluding_meal_is_empty() {
        let store = MemoryStore::new();
        let carrot = ingredient(&store, "carrot").await;
        let soup = recipe(&store, "Soup", &[(&carrot, "200", Unit::Grams)]).await;
        store.create_meal(date("2024-01-01"), soup.recipe_id).await.unwrap();

        let range = DateRange::new(date("2024-01-02"), date("2024-01-31")).unwrap();
        let rows = compute_shortfall(&store, range, &ScaleFactor::default())
            .await
            .unwrap();

        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_needs_add_up_across_meals() {
        let store = MemoryStore::new();
        let carrot = ingredient(&store, "carrot").await;
        let soup = recipe(&store, "Soup", &[(&carrot, "200", Unit::Grams)]).await;
        let salad = recipe(&store, "Salad", &[(&carrot, "75.5", Unit::Grams)]).await;
        store.create_meal(date("2024-01-01"), soup.recipe_id).await.unwrap();
        store.create_meal(date("2024-01-01"), salad.recipe_id).await.unwrap();
        store.create_meal(date("2024-01-02"), soup.recipe_id).await.unwrap();

        let range = DateRange::new(date("2024-01-01"), date("2024-01-02")).unwrap();
        let ledger = accumulate_needs(&store, range, &ScaleFactor::default())
            .await
            .unwrap();

        assert_eq!(
            ledger.get(NeedKey::new(carrot.ingredient_id, Unit::Grams)),
            dec("475.5")
        );
    }

    #[tokio::test]
    async fn test_units_are_never_merged() {
        let store = MemoryStore::new();
        let flour = ingredient(&store, "flour").await;
        let bread = recipe(&store, "Bread", &[(&flour, "500", Unit::Grams)]).await;
        store.create_meal(date("2024-01-01"), bread.recipe_id).await.unwrap();
        stock(&store, &flour, "1", Unit::Kilograms).await;

        let rows = compute_shortfall(&store, day("2024-01-01"), &ScaleFactor::default())
            .await
            .unwrap();

        assert_eq!(
            quantities(&rows),
            vec![("flour".to_string(), "500.00".to_string(), Unit::Grams)]
        );
    }

    #[tokio::test]
    async fn test_same_ingredient_in_two_units_gives_two_rows() {
        let store = MemoryStore::new();
        let egg = ingredient(&store, "egg").await;
        let cake = recipe(
            &store,
            "Cake",
            &[(&egg, "2", Unit::Pieces), (&egg, "30", Unit::Grams)],
        )
        .await;
        store.create_meal(date("2024-01-01"), cake.recipe_id).await.unwrap();

        let rows = compute_shortfall(&store, day("2024-01-01"), &ScaleFactor::default())
            .await
            .unwrap();

        assert_eq!(
            quantities(&rows),
            vec![
                ("egg".to_string(), "30.00".to_string(), Unit::Grams),
                ("egg".to_string(), "2.00".to_string(), Unit::Pieces),
            ]
        );
    }

    #[tokio::test]
    async fn test_scale_is_linear_before_pantry() {
        let store = MemoryStore::new();
        let carrot = ingredient(&store, "carrot").await;
        let onion = ingredient(&store, "onion").await;
        let soup = recipe(
            &store,
            "Soup",
            &[(&carrot, "200", Unit::Grams), (&onion, "1.5", Unit::Pieces)],
        )
        .await;
        store.create_meal(date("2024-01-01"), soup.recipe_id).await.unwrap();

        let once = accumulate_needs(&store, day("2024-01-01"), &ScaleFactor::default())
            .await
            .unwrap();
        let twice = accumulate_needs(&store, day("2024-01-01"), &"2".parse::<ScaleFactor>().unwrap())
            .await
            .unwrap();

        for key in [
            NeedKey::new(carrot.ingredient_id, Unit::Grams),
            NeedKey::new(onion.ingredient_id, Unit::Pieces),
        ] {
            assert_eq!(twice.get(key), once.get(key) * BigDecimal::from(2));
        }
    }

    #[tokio::test]
    async fn test_scale_ignores_recipe_servings() {
        let store = MemoryStore::new();
        let rice = ingredient(&store, "rice").await;
        let pilaf = recipe(&store, "Pilaf", &[(&rice, "300", Unit::Grams)]).await;
        store
            .update_recipe(
                pilaf.recipe_id,
                crate::cooking::recipe::RecipeChanges {
                    servings: Some(6),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        store.create_meal(date("2024-01-01"), pilaf.recipe_id).await.unwrap();

        let rows = compute_shortfall(&store, day("2024-01-01"), &"3".parse::<ScaleFactor>().unwrap())
            .await
            .unwrap();

        assert_eq!(rows[0].quantity_needed.to_string(), "900.00");
    }

    #[tokio::test]
    async fn test_rounds_half_up() {
        let store = MemoryStore::new();
        let saffron = ingredient(&store, "saffron").await;
        let paella = recipe(&store, "Paella", &[(&saffron, "0.25", Unit::Grams)]).await;
        store.create_meal(date("2024-01-01"), paella.recipe_id).await.unwrap();

        let rows = compute_shortfall(&store, day("2024-01-01"), &"0.5".parse::<ScaleFactor>().unwrap())
            .await
            .unwrap();

        assert_eq!(rows[0].quantity_needed.to_string(), "0.13");
    }

    #[tokio::test]
    async fn test_tiny_shortfall_still_reported_after_rounding() {
        let store = MemoryStore::new();
        let saffron = ingredient(&store, "saffron").await;
        let paella = recipe(&store, "Paella", &[(&saffron, "0.01", Unit::Grams)]).await;
        store.create_meal(date("2024-01-01"), paella.recipe_id).await.unwrap();

        let rows = compute_shortfall(&store, day("2024-01-01"), &"0.1".parse::<ScaleFactor>().unwrap())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity_needed.to_string(), "0.00");
    }

    #[tokio::test]
    async fn test_recipe_without_lines_contributes_nothing() {
        let store = MemoryStore::new();
        let carrot = ingredient(&store, "carrot").await;
        let soup = recipe(&store, "Soup", &[(&carrot, "200", Unit::Grams)]).await;
        store
            .replace_ingredient_lines(soup.recipe_id, vec![])
            .await
            .unwrap();
        store.create_meal(date("2024-01-01"), soup.recipe_id).await.unwrap();

        let rows = compute_shortfall(&store, day("2024-01-01"), &ScaleFactor::default())
            .await
            .unwrap();

        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_pantry_only_items_are_not_reported() {
        let store = MemoryStore::new();
        let carrot = ingredient(&store, "carrot").await;
        let salt = ingredient(&store, "salt").await;
        let soup = recipe(&store, "Soup", &[(&carrot, "200", Unit::Grams)]).await;
        store.create_meal(date("2024-01-01"), soup.recipe_id).await.unwrap();
        store
            .upsert_pantry_quantity(salt.ingredient_id, Unit::Grams, dec("-10"), UpsertMode::Set)
            .await
            .unwrap();

        let rows = compute_shortfall(&store, day("2024-01-01"), &ScaleFactor::default())
            .await
            .unwrap();

        assert_eq!(
            quantities(&rows),
            vec![("carrot".to_string(), "200.00".to_string(), Unit::Grams)]
        );
    }

    #[tokio::test]
    async fn test_rows_sorted_by_name() {
        let store = MemoryStore::new();
        let onion = ingredient(&store, "onion").await;
        let carrot = ingredient(&store, "carrot").await;
        let leek = ingredient(&store, "leek").await;
        let soup = recipe(
            &store,
            "Soup",
            &[
                (&onion, "1", Unit::Pieces),
                (&leek, "1", Unit::Pieces),
                (&carrot, "200", Unit::Grams),
            ],
        )
        .await;
        store.create_meal(date("2024-01-01"), soup.recipe_id).await.unwrap();

        let rows = compute_shortfall(&store, day("2024-01-01"), &ScaleFactor::default())
            .await
            .unwrap();

        let names: Vec<_> = rows.iter().map(|r| r.ingredient_name.as_str()).collect();
        assert_eq!(names, vec!["carrot", "leek", "onion"]);
    }

    #[tokio::test]
    async fn test_row_serializes_quantity_as_string() {
        let row = ShortfallRow {
            ingredient_id: Uuid::nil(),
            ingredient_name: "carrot".to_string(),
            quantity_needed: dec("150.00"),
            unit: Unit::Grams,
        };

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["quantity_needed"], "150.00");
        assert_eq!(json["unit"], "g");
    }
}
