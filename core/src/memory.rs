use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;

use crate::models::{MealPlan, Recipe, Weekday};
use crate::store::{MealPlanStore, PlannerStore, RecipeStore};

/// Process-lifetime storage keyed by user.
#[derive(Default)]
pub struct MemoryStore {
    recipes: RwLock<HashMap<String, Vec<Recipe>>>,
    plans: RwLock<HashMap<String, MealPlan>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecipeStore for MemoryStore {
    fn list(&self, user: &str) -> Result<Vec<Recipe>> {
        let recipes = self.recipes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(recipes.get(user).cloned().unwrap_or_default())
    }

    fn get(&self, user: &str, id: &str) -> Result<Option<Recipe>> {
        let recipes = self.recipes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(recipes
            .get(user)
            .and_then(|list| list.iter().find(|r| r.id == id))
            .cloned())
    }

    fn insert(&self, user: &str, recipe: &Recipe) -> Result<()> {
        let mut recipes = self.recipes.write().unwrap_or_else(PoisonError::into_inner);
        recipes
            .entry(user.to_string())
            .or_default()
            .push(recipe.clone());
        Ok(())
    }

    fn replace(&self, user: &str, recipe: &Recipe) -> Result<bool> {
        let mut recipes = self.recipes.write().unwrap_or_else(PoisonError::into_inner);
        let slot = recipes
            .get_mut(user)
            .and_then(|list| list.iter_mut().find(|r| r.id == recipe.id));
        match slot {
            Some(existing) => {
                *existing = recipe.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&self, user: &str, id: &str) -> Result<bool> {
        let mut recipes = self.recipes.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = recipes.get_mut(user) else {
            return Ok(false);
        };
        match list.iter().position(|r| r.id == id) {
            Some(index) => {
                list.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear(&self, user: &str) -> Result<()> {
        let mut recipes = self.recipes.write().unwrap_or_else(PoisonError::into_inner);
        recipes.remove(user);
        Ok(())
    }
}

impl MealPlanStore for MemoryStore {
    fn plan(&self, user: &str) -> Result<MealPlan> {
        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        Ok(plans.entry(user.to_string()).or_default().clone())
    }

    fn append(&self, user: &str, day: Weekday, recipe_id: &str) -> Result<()> {
        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        plans
            .entry(user.to_string())
            .or_default()
            .day_mut(day)
            .push(recipe_id.to_string());
        Ok(())
    }

    fn remove_first(&self, user: &str, day: Weekday, recipe_id: &str) -> Result<bool> {
        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        let slot = plans.entry(user.to_string()).or_default().day_mut(day);
        match slot.iter().position(|id| id == recipe_id) {
            Some(index) => {
                slot.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_all(&self, user: &str, recipe_id: &str) -> Result<usize> {
        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        let Some(plan) = plans.get_mut(user) else {
            return Ok(0);
        };
        let mut removed = 0;
        for day in Weekday::ALL {
            let slot = plan.day_mut(day);
            let before = slot.len();
            slot.retain(|id| id != recipe_id);
            removed += before - slot.len();
        }
        Ok(removed)
    }

    fn replace_plan(&self, user: &str, plan: &MealPlan) -> Result<()> {
        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        plans.insert(user.to_string(), plan.clone());
        Ok(())
    }
}

// Both locks are taken recipes first, then plans.
impl PlannerStore for MemoryStore {
    fn delete_recipe_cascade(&self, user: &str, id: &str) -> Result<Option<usize>> {
        let mut recipes = self.recipes.write().unwrap_or_else(PoisonError::into_inner);
        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);

        let Some(list) = recipes.get_mut(user) else {
            return Ok(None);
        };
        let Some(index) = list.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        list.remove(index);

        let mut removed = 0;
        if let Some(plan) = plans.get_mut(user) {
            for day in Weekday::ALL {
                let slot = plan.day_mut(day);
                let before = slot.len();
                slot.retain(|entry| entry != id);
                removed += before - slot.len();
            }
        }
        Ok(Some(removed))
    }

    fn replace_all(&self, user: &str, recipes: &[Recipe], plan: &MealPlan) -> Result<()> {
        let mut stored = self.recipes.write().unwrap_or_else(PoisonError::into_inner);
        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        stored.insert(user.to_string(), recipes.to_vec());
        plans.insert(user.to_string(), plan.clone());
        Ok(())
    }
}
