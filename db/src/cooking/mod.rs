pub mod ingredients;
pub mod meal_planning;
pub mod memory;
pub mod pantry;
pub mod quantity;
pub mod recipe;
pub mod shopping_list;
pub mod store;
pub mod units;

pub use ingredients::Ingredient;
pub use meal_planning::{DateRange, Meal, PlannedMeal};
pub use memory::MemoryStore;
pub use pantry::{PantryItem, UpsertMode};
pub use recipe::{IngredientLine, NewRecipe, Recipe, RecipeChanges, RecipeIngredient};
pub use shopping_list::{compute_shortfall, NeedKey, NeedLedger, ScaleFactor, ShortfallRow};
pub use store::{CatalogStore, PgStore, PlannerStore, RecipeStore, Store};
pub use units::{UnknownUnit, Unit};
