//! Store contracts consumed by the HTTP layer and the shopping list report,
//! plus the Postgres implementation backed by the model methods.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    ingredients::Ingredient,
    meal_planning::{DateRange, Meal, PlannedMeal},
    pantry::{PantryItem, UpsertMode},
    recipe::{IngredientLine, NewRecipe, Recipe, RecipeChanges, RecipeIngredient},
    units::Unit,
};
use crate::errors::Result;

/// Ingredients and pantry stock.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Returns the ingredient named `name`, creating it when absent. The flag
    /// is `true` when it was created.
    async fn find_or_create_ingredient(
        &self,
        name: &str,
        default_unit: Option<Unit>,
    ) -> Result<(Ingredient, bool)>;

    async fn get_ingredient(&self, ingredient_id: Uuid) -> Result<Option<Ingredient>>;

    async fn list_ingredients(&self) -> Result<Vec<Ingredient>>;

    /// Refused with a conflict while any recipe line references the
    /// ingredient. Its pantry stock is removed with it.
    async fn delete_ingredient(&self, ingredient_id: Uuid) -> Result<()>;

    /// Atomic per `(ingredient_id, unit)` key. The flag is `true` when a new
    /// pantry row was created.
    async fn upsert_pantry_quantity(
        &self,
        ingredient_id: Uuid,
        unit: Unit,
        quantity: BigDecimal,
        mode: UpsertMode,
    ) -> Result<(PantryItem, bool)>;

    async fn list_pantry(&self) -> Result<Vec<PantryItem>>;

    async fn delete_pantry_item(&self, pantry_item_id: Uuid) -> Result<()>;
}

/// Recipes and the requirement lines they own.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// Requires at least one line.
    async fn create_recipe(&self, recipe: NewRecipe, lines: Vec<IngredientLine>) -> Result<Recipe>;

    async fn get_recipe(&self, recipe_id: Uuid) -> Result<Option<Recipe>>;

    async fn list_recipes(&self) -> Result<Vec<Recipe>>;

    /// Replaces the line set only when `lines` is `Some`.
    async fn update_recipe(
        &self,
        recipe_id: Uuid,
        changes: RecipeChanges,
        lines: Option<Vec<IngredientLine>>,
    ) -> Result<Recipe>;

    /// Readers observe either the old or the new line set, never a mix.
    async fn replace_ingredient_lines(&self, recipe_id: Uuid, lines: Vec<IngredientLine>)
        -> Result<()>;

    async fn get_ingredient_lines(&self, recipe_id: Uuid) -> Result<Vec<RecipeIngredient>>;

    /// Cascades to the recipe's lines and to meals planned with it.
    async fn delete_recipe(&self, recipe_id: Uuid) -> Result<()>;
}

/// The meal calendar.
#[async_trait]
pub trait PlannerStore: Send + Sync {
    async fn create_meal(&self, date: NaiveDate, recipe_id: Uuid) -> Result<Meal>;

    async fn list_meals(&self, range: Option<DateRange>) -> Result<Vec<Meal>>;

    /// Inclusive on both bounds.
    async fn list_meals_in_range(&self, range: DateRange) -> Result<Vec<PlannedMeal>>;

    async fn delete_meal(&self, meal_id: Uuid) -> Result<()>;
}

/// Everything the service needs from persistence.
pub trait Store: CatalogStore + RecipeStore + PlannerStore {}

impl<T: CatalogStore + RecipeStore + PlannerStore> Store for T {}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn find_or_create_ingredient(
        &self,
        name: &str,
        default_unit: Option<Unit>,
    ) -> Result<(Ingredient, bool)> {
        Ingredient::find_or_create(&self.pool, name, default_unit).await
    }

    async fn get_ingredient(&self, ingredient_id: Uuid) -> Result<Option<Ingredient>> {
        Ingredient::get_by_id(&self.pool, ingredient_id).await
    }

    async fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        Ingredient::list(&self.pool).await
    }

    async fn delete_ingredient(&self, ingredient_id: Uuid) -> Result<()> {
        Ingredient::delete(&self.pool, ingredient_id).await
    }

    async fn upsert_pantry_quantity(
        &self,
        ingredient_id: Uuid,
        unit: Unit,
        quantity: BigDecimal,
        mode: UpsertMode,
    ) -> Result<(PantryItem, bool)> {
        PantryItem::upsert(&self.pool, ingredient_id, unit, &quantity, mode).await
    }

    async fn list_pantry(&self) -> Result<Vec<PantryItem>> {
        PantryItem::list(&self.pool).await
    }

    async fn delete_pantry_item(&self, pantry_item_id: Uuid) -> Result<()> {
        PantryItem::delete(&self.pool, pantry_item_id).await
    }
}

#[async_trait]
impl RecipeStore for PgStore {
    async fn create_recipe(&self, recipe: NewRecipe, lines: Vec<IngredientLine>) -> Result<Recipe> {
        Recipe::create(&self.pool, recipe, lines).await
    }

    async fn get_recipe(&self, recipe_id: Uuid) -> Result<Option<Recipe>> {
        Recipe::get_by_id(&self.pool, recipe_id).await
    }

    async fn list_recipes(&self) -> Result<Vec<Recipe>> {
        Recipe::list(&self.pool).await
    }

    async fn update_recipe(
        &self,
        recipe_id: Uuid,
        changes: RecipeChanges,
        lines: Option<Vec<IngredientLine>>,
    ) -> Result<Recipe> {
        Recipe::update(&self.pool, recipe_id, changes, lines).await
    }

    async fn replace_ingredient_lines(
        &self,
        recipe_id: Uuid,
        lines: Vec<IngredientLine>,
    ) -> Result<()> {
        Recipe::replace_ingredient_lines(&self.pool, recipe_id, lines).await
    }

    async fn get_ingredient_lines(&self, recipe_id: Uuid) -> Result<Vec<RecipeIngredient>> {
        RecipeIngredient::get_by_recipe(&self.pool, recipe_id).await
    }

    async fn delete_recipe(&self, recipe_id: Uuid) -> Result<()> {
        Recipe::delete(&self.pool, recipe_id).await
    }
}

#[async_trait]
impl PlannerStore for PgStore {
    async fn create_meal(&self, date: NaiveDate, recipe_id: Uuid) -> Result<Meal> {
        Meal::create(&self.pool, date, recipe_id).await
    }

    async fn list_meals(&self, range: Option<DateRange>) -> Result<Vec<Meal>> {
        Meal::list(&self.pool, range).await
    }

    async fn list_meals_in_range(&self, range: DateRange) -> Result<Vec<PlannedMeal>> {
        Meal::get_by_date_range(&self.pool, range).await
    }

    async fn delete_meal(&self, meal_id: Uuid) -> Result<()> {
        Meal::delete(&self.pool, meal_id).await
    }
}
