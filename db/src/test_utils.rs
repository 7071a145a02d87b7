//! Fixtures shared by the store, report and HTTP tests. All of them panic on
//! failure.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::cooking::{
    CatalogStore, Ingredient, IngredientLine, NewRecipe, PantryItem, Recipe, RecipeStore, Unit,
    UpsertMode,
};

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).expect("valid decimal literal")
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid YYYY-MM-DD date")
}

pub async fn ingredient<S: CatalogStore + ?Sized>(store: &S, name: &str) -> Ingredient {
    store
        .find_or_create_ingredient(name, None)
        .await
        .expect("Failed to create ingredient")
        .0
}

/// Creates a two-serving recipe with the given `(ingredient, quantity, unit)`
/// lines.
pub async fn recipe<S: RecipeStore + ?Sized>(
    store: &S,
    title: &str,
    lines: &[(&Ingredient, &str, Unit)],
) -> Recipe {
    let lines = lines
        .iter()
        .map(|(ingredient, quantity, unit)| IngredientLine {
            ingredient_id: ingredient.ingredient_id,
            quantity: dec(quantity),
            unit: *unit,
        })
        .collect();

    store
        .create_recipe(
            NewRecipe {
                title: title.to_string(),
                servings: 2,
                ..NewRecipe::default()
            },
            lines,
        )
        .await
        .expect("Failed to create recipe")
}

/// Sets pantry stock for `(ingredient, unit)`.
pub async fn stock<S: CatalogStore + ?Sized>(
    store: &S,
    ingredient: &Ingredient,
    quantity: &str,
    unit: Unit,
) -> PantryItem {
    store
        .upsert_pantry_quantity(ingredient.ingredient_id, unit, dec(quantity), UpsertMode::Set)
        .await
        .expect("Failed to stock pantry")
        .0
}
