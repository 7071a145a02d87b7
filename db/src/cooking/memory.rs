//! In-process store used when no database is configured and in tests.
//!
//! All tables sit behind one `RwLock`; every write holds the write guard for
//! its whole read-modify-write, which gives the same per-key atomicity the
//! Postgres store gets from row locks and transactions.

use std::collections::HashMap;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    ingredients::{normalize_name, Ingredient},
    meal_planning::{DateRange, Meal, PlannedMeal},
    pantry::{PantryItem, UpsertMode},
    quantity,
    recipe::{validate_lines, IngredientLine, NewRecipe, Recipe, RecipeChanges, RecipeIngredient},
    store::{CatalogStore, PlannerStore, RecipeStore},
    units::Unit,
};
use crate::errors::{Result, StoreError};

#[derive(Debug, Default)]
struct Tables {
    ingredients: HashMap<Uuid, Ingredient>,
    pantry: HashMap<Uuid, PantryItem>,
    recipes: HashMap<Uuid, Recipe>,
    lines: HashMap<Uuid, Vec<RecipeIngredient>>,
    meals: HashMap<Uuid, Meal>,
}

impl Tables {
    fn build_lines(
        &self,
        recipe_id: Uuid,
        lines: Vec<IngredientLine>,
    ) -> Result<Vec<RecipeIngredient>> {
        validate_lines(lines)?
            .into_iter()
            .map(|line| {
                let ingredient = self
                    .ingredients
                    .get(&line.ingredient_id)
                    .ok_or_else(|| StoreError::not_found("ingredient", line.ingredient_id))?;

                Ok(RecipeIngredient {
                    recipe_ingredient_id: Uuid::new_v4(),
                    recipe_id,
                    ingredient_id: line.ingredient_id,
                    ingredient_name: ingredient.name.clone(),
                    ingredient_default_unit: ingredient.default_unit,
                    quantity: line.quantity,
                    unit: line.unit,
                })
            })
            .collect()
    }

    fn meals_in(&self, range: Option<DateRange>) -> Vec<Meal> {
        let mut meals: Vec<_> = self
            .meals
            .values()
            .filter(|meal| range.map_or(true, |range| range.contains(meal.date)))
            .cloned()
            .collect();
        meals.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));
        meals
    }

    fn ingredient_name(&self, ingredient_id: Uuid) -> &str {
        self.ingredients
            .get(&ingredient_id)
            .map_or("", |i| i.name.as_str())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find_or_create_ingredient(
        &self,
        name: &str,
        default_unit: Option<Unit>,
    ) -> Result<(Ingredient, bool)> {
        let name = normalize_name(name)?;
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.ingredients.values_mut().find(|i| i.name == name) {
            if let Some(unit) = default_unit {
                if existing.default_unit != unit {
                    existing.default_unit = unit;
                    existing.updated_at = Utc::now();
                }
            }
            return Ok((existing.clone(), false));
        }

        let now = Utc::now();
        let ingredient = Ingredient {
            ingredient_id: Uuid::new_v4(),
            name: name.to_string(),
            default_unit: default_unit.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        tables
            .ingredients
            .insert(ingredient.ingredient_id, ingredient.clone());

        Ok((ingredient, true))
    }

    async fn get_ingredient(&self, ingredient_id: Uuid) -> Result<Option<Ingredient>> {
        Ok(self.tables.read().await.ingredients.get(&ingredient_id).cloned())
    }

    async fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut ingredients: Vec<_> = self
            .tables
            .read()
            .await
            .ingredients
            .values()
            .cloned()
            .collect();
        ingredients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ingredients)
    }

    async fn delete_ingredient(&self, ingredient_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;

        if !tables.ingredients.contains_key(&ingredient_id) {
            return Err(StoreError::not_found("ingredient", ingredient_id));
        }
        let in_use = tables
            .lines
            .values()
            .flatten()
            .any(|line| line.ingredient_id == ingredient_id);
        if in_use {
            return Err(StoreError::Conflict(format!(
                "ingredient {ingredient_id} is used by at least one recipe"
            )));
        }

        tables.pantry.retain(|_, item| item.ingredient_id != ingredient_id);
        tables.ingredients.remove(&ingredient_id);

        Ok(())
    }

    async fn upsert_pantry_quantity(
        &self,
        ingredient_id: Uuid,
        unit: Unit,
        quantity: BigDecimal,
        mode: UpsertMode,
    ) -> Result<(PantryItem, bool)> {
        let quantity = quantity::fit("quantity", &quantity)?;
        let mut tables = self.tables.write().await;

        if !tables.ingredients.contains_key(&ingredient_id) {
            return Err(StoreError::not_found("ingredient", ingredient_id));
        }

        let existing = tables
            .pantry
            .values_mut()
            .find(|item| item.ingredient_id == ingredient_id && item.unit == unit);

        if let Some(item) = existing {
            item.quantity = quantity::fit("quantity", &mode.apply(Some(&item.quantity), &quantity))?;
            item.updated_at = Utc::now();
            return Ok((item.clone(), false));
        }

        let now = Utc::now();
        let item = PantryItem {
            pantry_item_id: Uuid::new_v4(),
            ingredient_id,
            quantity: mode.apply(None, &quantity),
            unit,
            created_at: now,
            updated_at: now,
        };
        tables.pantry.insert(item.pantry_item_id, item.clone());

        Ok((item, true))
    }

    async fn list_pantry(&self) -> Result<Vec<PantryItem>> {
        let tables = self.tables.read().await;
        let mut items: Vec<_> = tables.pantry.values().cloned().collect();
        items.sort_by(|a, b| {
            tables
                .ingredient_name(a.ingredient_id)
                .cmp(tables.ingredient_name(b.ingredient_id))
                .then(a.unit.as_str().cmp(b.unit.as_str()))
        });
        Ok(items)
    }

    async fn delete_pantry_item(&self, pantry_item_id: Uuid) -> Result<()> {
        self.tables
            .write()
            .await
            .pantry
            .remove(&pantry_item_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("pantry item", pantry_item_id))
    }
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn create_recipe(&self, recipe: NewRecipe, lines: Vec<IngredientLine>) -> Result<Recipe> {
        if lines.is_empty() {
            return Err(StoreError::validation(
                "ingredients",
                "at least one ingredient is required",
            ));
        }
        let recipe = recipe.validate()?;
        let mut tables = self.tables.write().await;

        let recipe_id = Uuid::new_v4();
        let lines = tables.build_lines(recipe_id, lines)?;

        let now = Utc::now();
        let created = Recipe {
            recipe_id,
            title: recipe.title,
            description: recipe.description,
            servings: recipe.servings,
            image: recipe.image,
            created_at: now,
            updated_at: now,
        };
        tables.recipes.insert(recipe_id, created.clone());
        tables.lines.insert(recipe_id, lines);

        Ok(created)
    }

    async fn get_recipe(&self, recipe_id: Uuid) -> Result<Option<Recipe>> {
        Ok(self.tables.read().await.recipes.get(&recipe_id).cloned())
    }

    async fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut recipes: Vec<_> = self.tables.read().await.recipes.values().cloned().collect();
        recipes.sort_by(|a, b| {
            a.title
                .cmp(&b.title)
                .then(a.recipe_id.cmp(&b.recipe_id))
        });
        Ok(recipes)
    }

    async fn update_recipe(
        &self,
        recipe_id: Uuid,
        changes: RecipeChanges,
        lines: Option<Vec<IngredientLine>>,
    ) -> Result<Recipe> {
        let mut tables = self.tables.write().await;

        let mut recipe = tables
            .recipes
            .get(&recipe_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("recipe", recipe_id))?;
        changes.apply_to(&mut recipe)?;
        let lines = lines
            .map(|lines| tables.build_lines(recipe_id, lines))
            .transpose()?;

        recipe.updated_at = Utc::now();
        tables.recipes.insert(recipe_id, recipe.clone());
        if let Some(lines) = lines {
            tables.lines.insert(recipe_id, lines);
        }

        Ok(recipe)
    }

    async fn replace_ingredient_lines(
        &self,
        recipe_id: Uuid,
        lines: Vec<IngredientLine>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;

        if !tables.recipes.contains_key(&recipe_id) {
            return Err(StoreError::not_found("recipe", recipe_id));
        }
        let lines = tables.build_lines(recipe_id, lines)?;
        tables.lines.insert(recipe_id, lines);

        Ok(())
    }

    async fn get_ingredient_lines(&self, recipe_id: Uuid) -> Result<Vec<RecipeIngredient>> {
        Ok(self
            .tables
            .read()
            .await
            .lines
            .get(&recipe_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_recipe(&self, recipe_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;

        if tables.recipes.remove(&recipe_id).is_none() {
            return Err(StoreError::not_found("recipe", recipe_id));
        }
        tables.lines.remove(&recipe_id);
        tables.meals.retain(|_, meal| meal.recipe_id != recipe_id);

        Ok(())
    }
}

#[async_trait]
impl PlannerStore for MemoryStore {
    async fn create_meal(&self, date: NaiveDate, recipe_id: Uuid) -> Result<Meal> {
        let mut tables = self.tables.write().await;

        if !tables.recipes.contains_key(&recipe_id) {
            return Err(StoreError::not_found("recipe", recipe_id));
        }
        if tables
            .meals
            .values()
            .any(|meal| meal.date == date && meal.recipe_id == recipe_id)
        {
            return Err(StoreError::Conflict(format!(
                "recipe {recipe_id} is already planned on {date}"
            )));
        }

        let meal = Meal {
            meal_id: Uuid::new_v4(),
            date,
            recipe_id,
            created_at: Utc::now(),
        };
        tables.meals.insert(meal.meal_id, meal.clone());

        Ok(meal)
    }

    async fn list_meals(&self, range: Option<DateRange>) -> Result<Vec<Meal>> {
        Ok(self.tables.read().await.meals_in(range))
    }

    async fn list_meals_in_range(&self, range: DateRange) -> Result<Vec<PlannedMeal>> {
        let tables = self.tables.read().await;

        tables
            .meals_in(Some(range))
            .into_iter()
            .map(|meal| {
                let recipe = tables.recipes.get(&meal.recipe_id).cloned().ok_or_else(|| {
                    StoreError::Consistency(format!(
                        "meal {} references missing recipe {}",
                        meal.meal_id, meal.recipe_id
                    ))
                })?;
                Ok(PlannedMeal { meal, recipe })
            })
            .collect()
    }

    async fn delete_meal(&self, meal_id: Uuid) -> Result<()> {
        self.tables
            .write()
            .await
            .meals
            .remove(&meal_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("meal", meal_id))
    }
}
