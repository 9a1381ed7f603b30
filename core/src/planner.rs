use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{PlanError, PlanResult};
use crate::memory::MemoryStore;
use crate::models::{
    DetailedPlan, EXPORT_VERSION, ExportData, ImportSummary, MealPlan, Recipe, RecipeInput,
    ShoppingList, Weekday,
};
use crate::shopping;
use crate::store::{MealPlanStore, PlannerStore, RecipeStore};

/// Single entry point for recipe and plan operations.
///
/// Keeps the recipe table and the weekly plan consistent: deleting a recipe
/// removes every reference to it, assignments must name an existing recipe,
/// and plan reads substitute a placeholder for any reference that no longer
/// resolves. Every operation holds the user's lock for its full duration, so
/// readers never observe a half-applied cascade.
pub struct Planner {
    store: Arc<dyn PlannerStore>,
    locks: UserLocks,
}

/// One mutex per user with an operation in flight. Entries are dropped once
/// their last holder releases them.
#[derive(Default)]
struct UserLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    fn acquire(&self, user: &str) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(table.entry(user.to_string()).or_default())
    }

    fn release(&self, user: &str, lock: Arc<Mutex<()>>) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if table
            .get(user)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            table.remove(user);
        }
    }
}

impl Planner {
    pub fn new(store: Arc<dyn PlannerStore>) -> Self {
        Self {
            store,
            locks: UserLocks::default(),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    #[must_use]
    pub fn with_database(db: Database) -> Self {
        Self::new(Arc::new(db))
    }

    fn with_user<T>(&self, user: &str, op: impl FnOnce() -> PlanResult<T>) -> PlanResult<T> {
        let lock = self.locks.acquire(user);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };
        self.locks.release(user, lock);
        result
    }

    // --- Recipes ---

    pub fn list_recipes(&self, user: &str) -> PlanResult<Vec<Recipe>> {
        self.with_user(user, || Ok(self.store.list(user)?))
    }

    pub fn get_recipe(&self, user: &str, id: &str) -> PlanResult<Recipe> {
        self.with_user(user, || {
            self.store
                .get(user, id)?
                .ok_or_else(|| PlanError::NotFound(id.to_string()))
        })
    }

    pub fn create_recipe(&self, user: &str, input: RecipeInput) -> PlanResult<Recipe> {
        let new_recipe = input.validate()?;
        self.with_user(user, || {
            let id = self.fresh_id(user)?;
            let recipe = new_recipe.into_recipe(id);
            self.store.insert(user, &recipe)?;
            debug!(user, id = %recipe.id, name = %recipe.name, "recipe created");
            Ok(recipe)
        })
    }

    /// Replace name, ingredients and instructions. The payload is validated
    /// before the store is touched, so a rejected update changes nothing.
    pub fn update_recipe(&self, user: &str, id: &str, input: RecipeInput) -> PlanResult<Recipe> {
        let new_recipe = input.validate()?;
        self.with_user(user, || {
            let recipe = new_recipe.into_recipe(id.to_string());
            if !self.store.replace(user, &recipe)? {
                return Err(PlanError::NotFound(id.to_string()));
            }
            debug!(user, id, "recipe updated");
            Ok(recipe)
        })
    }

    /// Delete a recipe and every plan entry that references it. Returns the
    /// number of plan entries removed.
    pub fn delete_recipe(&self, user: &str, id: &str) -> PlanResult<usize> {
        self.with_user(user, || {
            let removed = self
                .store
                .delete_recipe_cascade(user, id)?
                .ok_or_else(|| PlanError::NotFound(id.to_string()))?;
            debug!(user, id, removed, "recipe deleted");
            Ok(removed)
        })
    }

    fn fresh_id(&self, user: &str) -> PlanResult<String> {
        loop {
            let id = Uuid::new_v4().to_string();
            if self.store.get(user, &id)?.is_none() {
                return Ok(id);
            }
        }
    }

    // --- Plan ---

    /// Raw plan: recipe ids per day, unresolved.
    pub fn plan(&self, user: &str) -> PlanResult<MealPlan> {
        self.with_user(user, || Ok(self.store.plan(user)?))
    }

    /// Plan with every id resolved. Never fails on a dangling id.
    pub fn detailed_plan(&self, user: &str) -> PlanResult<DetailedPlan> {
        self.with_user(user, || self.detailed_plan_locked(user))
    }

    fn detailed_plan_locked(&self, user: &str) -> PlanResult<DetailedPlan> {
        let plan = self.store.plan(user)?;
        let recipes = self.store.list(user)?;
        Ok(resolve_for_read(user, &plan, &recipes))
    }

    pub fn assign(&self, user: &str, day: &str, recipe_id: &str) -> PlanResult<()> {
        let day: Weekday = day.parse()?;
        self.with_user(user, || {
            self.require_recipe(user, recipe_id)?;
            self.store.append(user, day, recipe_id)?;
            debug!(user, %day, recipe_id, "recipe assigned");
            Ok(())
        })
    }

    /// Remove the first occurrence of `recipe_id` on `day`.
    pub fn unassign(&self, user: &str, day: &str, recipe_id: &str) -> PlanResult<()> {
        let day: Weekday = day.parse()?;
        self.with_user(user, || {
            if !self.store.remove_first(user, day, recipe_id)? {
                return Err(PlanError::NotAssigned {
                    day: day.to_string(),
                    recipe_id: recipe_id.to_string(),
                });
            }
            debug!(user, %day, recipe_id, "recipe unassigned");
            Ok(())
        })
    }

    /// Write-path check: the referenced recipe has to exist.
    fn require_recipe(&self, user: &str, recipe_id: &str) -> PlanResult<Recipe> {
        self.store
            .get(user, recipe_id)?
            .ok_or_else(|| PlanError::RecipeNotFound(recipe_id.to_string()))
    }

    // --- Shopping ---

    pub fn shopping_list(&self, user: &str) -> PlanResult<ShoppingList> {
        let plan = self.detailed_plan(user)?;
        Ok(shopping::consolidate(&plan))
    }

    // --- Export / Import ---

    pub fn export(&self, user: &str) -> PlanResult<ExportData> {
        self.with_user(user, || {
            Ok(ExportData {
                version: EXPORT_VERSION,
                recipes: self.store.list(user)?,
                plan: self.store.plan(user)?,
            })
        })
    }

    /// Replace the user's recipes and plan with `data`.
    ///
    /// Plan entries are taken as they are, without checking that they name
    /// an imported recipe. Recipes repeating an earlier id are skipped, and
    /// recipes without an id get a fresh one.
    pub fn import(&self, user: &str, data: ExportData) -> PlanResult<ImportSummary> {
        if data.version > EXPORT_VERSION {
            return Err(PlanError::validation(format!(
                "Unsupported export version {} (newest supported: {EXPORT_VERSION})",
                data.version
            )));
        }
        self.with_user(user, || {
            let mut seen = HashSet::new();
            let mut recipes = Vec::with_capacity(data.recipes.len());
            for mut recipe in data.recipes {
                if recipe.id.trim().is_empty() {
                    recipe.id = Uuid::new_v4().to_string();
                }
                if !seen.insert(recipe.id.clone()) {
                    warn!(user, id = %recipe.id, "skipping recipe with duplicate id");
                    continue;
                }
                recipes.push(recipe);
            }
            self.store.replace_all(user, &recipes, &data.plan)?;

            let dangling = data
                .plan
                .iter()
                .flat_map(|(_, ids)| ids)
                .filter(|id| !seen.contains(*id))
                .count();
            let summary = ImportSummary {
                recipes: seen.len(),
                assignments: data.plan.len(),
                dangling,
            };
            info!(
                user,
                recipes = summary.recipes,
                assignments = summary.assignments,
                dangling = summary.dangling,
                "import complete"
            );
            Ok(summary)
        })
    }
}

/// Read-path resolution: ids without a recipe become placeholders.
fn resolve_for_read(user: &str, plan: &MealPlan, recipes: &[Recipe]) -> DetailedPlan {
    let by_id: HashMap<&str, &Recipe> = recipes.iter().map(|r| (r.id.as_str(), r)).collect();
    plan.map(|id| match by_id.get(id.as_str()) {
        Some(recipe) => (*recipe).clone(),
        None => {
            warn!(user, id = %id, "plan references a missing recipe");
            Recipe::placeholder(id)
        }
    })
}
