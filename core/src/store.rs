//! Storage seams for recipes and weekly plans.
//!
//! Backends are plain per-user tables: they report absence through `Option`
//! and `bool` and reserve errors for genuine backend failures. Referential
//! rules between the two tables live in [`crate::planner::Planner`], which
//! also serialises access per user. Writes that touch both tables go through
//! [`PlannerStore`] and must apply completely or not at all.

use anyhow::Result;

use crate::models::{MealPlan, Recipe, Weekday};

pub trait RecipeStore: Send + Sync {
    /// All recipes of `user`, in insertion order.
    fn list(&self, user: &str) -> Result<Vec<Recipe>>;

    fn get(&self, user: &str, id: &str) -> Result<Option<Recipe>>;

    /// Append a recipe to the user's collection.
    fn insert(&self, user: &str, recipe: &Recipe) -> Result<()>;

    /// Overwrite the stored recipe with the same id, keeping its position.
    /// Returns false when no such recipe exists.
    fn replace(&self, user: &str, recipe: &Recipe) -> Result<bool>;

    fn remove(&self, user: &str, id: &str) -> Result<bool>;

    /// Drop every recipe of `user`.
    fn clear(&self, user: &str) -> Result<()>;
}

pub trait MealPlanStore: Send + Sync {
    /// The user's plan; a user never seen before gets seven empty days.
    fn plan(&self, user: &str) -> Result<MealPlan>;

    fn append(&self, user: &str, day: Weekday, recipe_id: &str) -> Result<()>;

    /// Remove the first occurrence of `recipe_id` on `day`.
    fn remove_first(&self, user: &str, day: Weekday, recipe_id: &str) -> Result<bool>;

    /// Remove every occurrence of `recipe_id` on every day, returning how
    /// many entries were dropped.
    fn remove_all(&self, user: &str, recipe_id: &str) -> Result<usize>;

    /// Replace the user's whole plan.
    fn replace_plan(&self, user: &str, plan: &MealPlan) -> Result<()>;
}

/// Both tables behind one backend, with the writes that span them.
pub trait PlannerStore: RecipeStore + MealPlanStore {
    /// Remove a recipe together with every plan entry that references it.
    /// Returns the number of plan entries dropped, or `None` when the user
    /// has no such recipe. On error nothing is removed.
    fn delete_recipe_cascade(&self, user: &str, id: &str) -> Result<Option<usize>>;

    /// Replace the user's recipes and plan. On error both are left as they
    /// were.
    fn replace_all(&self, user: &str, recipes: &[Recipe], plan: &MealPlan) -> Result<()>;
}
