pub(crate) mod ingredients;
pub(crate) mod meals;
pub(crate) mod pantry;
pub(crate) mod recipes;
