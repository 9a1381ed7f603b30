use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{Ingredient, MealPlan, Recipe, Weekday};
use crate::store::{MealPlanStore, PlannerStore, RecipeStore};

/// How long a write waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store. Implements both store traits over one connection.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn();
        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL,
                    user TEXT NOT NULL,
                    name TEXT NOT NULL,
                    instructions TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (user, id)
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_seq INTEGER NOT NULL REFERENCES recipes(seq) ON DELETE CASCADE,
                    position INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    quantity REAL NOT NULL,
                    unit TEXT NOT NULL
                );

                -- No foreign key to recipes: imported plans may reference
                -- recipes that do not exist.
                CREATE TABLE IF NOT EXISTS plan_entries (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    user TEXT NOT NULL,
                    day INTEGER NOT NULL CHECK (day BETWEEN 0 AND 6),
                    recipe_id TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_recipes_user ON recipes(user);
                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_seq);
                CREATE INDEX IF NOT EXISTS idx_plan_entries_user ON plan_entries(user, day);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    fn recipe_seq(conn: &Connection, user: &str, id: &str) -> Result<Option<i64>> {
        let seq = conn
            .query_row(
                "SELECT seq FROM recipes WHERE user = ?1 AND id = ?2",
                params![user, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq)
    }

    fn ingredients_for(conn: &Connection, recipe_seq: i64) -> Result<Vec<Ingredient>> {
        let mut stmt = conn.prepare(
            "SELECT name, quantity, unit FROM recipe_ingredients
             WHERE recipe_seq = ?1 ORDER BY position",
        )?;
        let ingredients = stmt
            .query_map(params![recipe_seq], |row| {
                Ok(Ingredient {
                    name: row.get(0)?,
                    quantity: row.get(1)?,
                    unit: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    fn insert_recipe(conn: &Connection, user: &str, recipe: &Recipe) -> Result<()> {
        let now = Local::now().to_rfc3339();
        conn.execute(
            "INSERT INTO recipes (id, user, name, instructions, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![recipe.id, user, recipe.name, recipe.instructions, now, now],
        )
        .with_context(|| format!("Failed to insert recipe {}", recipe.id))?;
        let seq = conn.last_insert_rowid();
        Self::write_ingredients(conn, seq, &recipe.ingredients)
    }

    fn delete_recipe_rows(conn: &Connection, user: &str, id: &str) -> Result<bool> {
        let Some(seq) = Self::recipe_seq(conn, user, id)? else {
            return Ok(false);
        };
        conn.execute(
            "DELETE FROM recipe_ingredients WHERE recipe_seq = ?1",
            params![seq],
        )?;
        conn.execute("DELETE FROM recipes WHERE seq = ?1", params![seq])?;
        Ok(true)
    }

    fn delete_user_recipes(conn: &Connection, user: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM recipe_ingredients
             WHERE recipe_seq IN (SELECT seq FROM recipes WHERE user = ?1)",
            params![user],
        )?;
        conn.execute("DELETE FROM recipes WHERE user = ?1", params![user])?;
        Ok(())
    }

    fn delete_plan_entries(conn: &Connection, user: &str, recipe_id: &str) -> Result<usize> {
        let rows = conn.execute(
            "DELETE FROM plan_entries WHERE user = ?1 AND recipe_id = ?2",
            params![user, recipe_id],
        )?;
        Ok(rows)
    }

    fn write_plan(conn: &Connection, user: &str, plan: &MealPlan) -> Result<()> {
        conn.execute("DELETE FROM plan_entries WHERE user = ?1", params![user])?;
        let mut stmt =
            conn.prepare("INSERT INTO plan_entries (user, day, recipe_id) VALUES (?1, ?2, ?3)")?;
        for (day, ids) in plan.iter() {
            for id in ids {
                stmt.execute(params![user, day_key(day), id])?;
            }
        }
        Ok(())
    }

    fn write_ingredients(conn: &Connection, recipe_seq: i64, ingredients: &[Ingredient]) -> Result<()> {
        let mut stmt = conn.prepare(
            "INSERT INTO recipe_ingredients (recipe_seq, position, name, quantity, unit)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (position, ing) in ingredients.iter().enumerate() {
            stmt.execute(params![
                recipe_seq,
                position_key(position),
                ing.name,
                ing.quantity,
                ing.unit
            ])?;
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_wrap)]
fn position_key(position: usize) -> i64 {
    position as i64
}

#[allow(clippy::cast_possible_wrap)]
fn day_key(day: Weekday) -> i64 {
    day.index() as i64
}

// --- Recipes ---

impl RecipeStore for Database {
    fn list(&self, user: &str) -> Result<Vec<Recipe>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT seq, id, name, instructions FROM recipes WHERE user = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![user], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Recipe {
                        id: row.get(1)?,
                        name: row.get(2)?,
                        ingredients: Vec::new(),
                        instructions: row.get(3)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, mut recipe)| {
                recipe.ingredients = Self::ingredients_for(&conn, seq)?;
                Ok(recipe)
            })
            .collect()
    }

    fn get(&self, user: &str, id: &str) -> Result<Option<Recipe>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT seq, id, name, instructions FROM recipes WHERE user = ?1 AND id = ?2",
                params![user, id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        Recipe {
                            id: row.get(1)?,
                            name: row.get(2)?,
                            ingredients: Vec::new(),
                            instructions: row.get(3)?,
                        },
                    ))
                },
            )
            .optional()?;

        match row {
            Some((seq, mut recipe)) => {
                recipe.ingredients = Self::ingredients_for(&conn, seq)?;
                Ok(Some(recipe))
            }
            None => Ok(None),
        }
    }

    fn insert(&self, user: &str, recipe: &Recipe) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        Self::insert_recipe(&tx, user, recipe)?;
        tx.commit()?;
        Ok(())
    }

    fn replace(&self, user: &str, recipe: &Recipe) -> Result<bool> {
        let now = Local::now().to_rfc3339();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let Some(seq) = Self::recipe_seq(&tx, user, &recipe.id)? else {
            return Ok(false);
        };
        tx.execute(
            "UPDATE recipes SET name = ?1, instructions = ?2, updated_at = ?3 WHERE seq = ?4",
            params![recipe.name, recipe.instructions, now, seq],
        )?;
        tx.execute(
            "DELETE FROM recipe_ingredients WHERE recipe_seq = ?1",
            params![seq],
        )?;
        Self::write_ingredients(&tx, seq, &recipe.ingredients)?;
        tx.commit()?;
        Ok(true)
    }

    fn remove(&self, user: &str, id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let removed = Self::delete_recipe_rows(&tx, user, id)?;
        tx.commit()?;
        Ok(removed)
    }

    fn clear(&self, user: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        Self::delete_user_recipes(&tx, user)?;
        tx.commit()?;
        Ok(())
    }
}

// --- Meal plans ---

impl MealPlanStore for Database {
    fn plan(&self, user: &str) -> Result<MealPlan> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT day, recipe_id FROM plan_entries WHERE user = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![user], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut plan = MealPlan::default();
        for (day, recipe_id) in rows {
            let day = usize::try_from(day)
                .ok()
                .and_then(Weekday::from_index)
                .with_context(|| format!("Invalid day {day} in plan_entries"))?;
            plan.day_mut(day).push(recipe_id);
        }
        Ok(plan)
    }

    fn append(&self, user: &str, day: Weekday, recipe_id: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO plan_entries (user, day, recipe_id) VALUES (?1, ?2, ?3)",
            params![user, day_key(day), recipe_id],
        )?;
        Ok(())
    }

    fn remove_first(&self, user: &str, day: Weekday, recipe_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM plan_entries WHERE seq = (
                SELECT MIN(seq) FROM plan_entries
                WHERE user = ?1 AND day = ?2 AND recipe_id = ?3
            )",
            params![user, day_key(day), recipe_id],
        )?;
        Ok(rows > 0)
    }

    fn remove_all(&self, user: &str, recipe_id: &str) -> Result<usize> {
        Self::delete_plan_entries(&self.conn(), user, recipe_id)
    }

    fn replace_plan(&self, user: &str, plan: &MealPlan) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        Self::write_plan(&tx, user, plan)?;
        tx.commit()?;
        Ok(())
    }
}

// --- Cross-table writes ---

impl PlannerStore for Database {
    fn delete_recipe_cascade(&self, user: &str, id: &str) -> Result<Option<usize>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if !Self::delete_recipe_rows(&tx, user, id)? {
            return Ok(None);
        }
        let removed = Self::delete_plan_entries(&tx, user, id)?;
        tx.commit()?;
        Ok(Some(removed))
    }

    fn replace_all(&self, user: &str, recipes: &[Recipe], plan: &MealPlan) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        Self::delete_user_recipes(&tx, user)?;
        for recipe in recipes {
            Self::insert_recipe(&tx, user, recipe)?;
        }
        Self::write_plan(&tx, user, plan)?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soup() -> Recipe {
        Recipe {
            id: "soup-1".to_string(),
            name: "Soup".to_string(),
            ingredients: vec![
                Ingredient::new("Carrot", 2.0, "pcs"),
                Ingredient::new("Water", 1.5, "l"),
            ],
            instructions: "Boil".to_string(),
        }
    }

    #[test]
    fn test_insert_and_get_recipe() {
        let db = Database::open_in_memory().unwrap();
        db.insert("alice", &soup()).unwrap();

        let fetched = db.get("alice", "soup-1").unwrap().unwrap();
        assert_eq!(fetched, soup());
        assert!(db.get("alice", "missing").unwrap().is_none());
        assert!(db.get("bob", "soup-1").unwrap().is_none());
    }

    #[test]
    fn test_same_id_for_two_users() {
        let db = Database::open_in_memory().unwrap();
        db.insert("alice", &soup()).unwrap();
        db.insert("bob", &soup()).unwrap();

        assert!(db.remove("alice", "soup-1").unwrap());
        assert!(db.get("alice", "soup-1").unwrap().is_none());
        assert_eq!(db.get("bob", "soup-1").unwrap().unwrap(), soup());
    }

    #[test]
    fn test_list_in_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        let mut second = soup();
        second.id = "b".to_string();
        second.name = "Bread".to_string();
        let mut first = soup();
        first.id = "a".to_string();
        first.name = "Apple Pie".to_string();

        db.insert("alice", &second).unwrap();
        db.insert("alice", &first).unwrap();

        let names: Vec<_> = db
            .list("alice")
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["Bread", "Apple Pie"]);
        assert!(db.list("bob").unwrap().is_empty());
    }

    #[test]
    fn test_replace_recipe_rewrites_ingredients() {
        let db = Database::open_in_memory().unwrap();
        db.insert("alice", &soup()).unwrap();

        let mut edited = soup();
        edited.name = "Carrot Soup".to_string();
        edited.ingredients = vec![Ingredient::new("Carrot", 4.0, "pcs")];
        assert!(db.replace("alice", &edited).unwrap());

        let fetched = db.get("alice", "soup-1").unwrap().unwrap();
        assert_eq!(fetched, edited);

        let mut unknown = soup();
        unknown.id = "nope".to_string();
        assert!(!db.replace("alice", &unknown).unwrap());
    }

    #[test]
    fn test_remove_and_clear() {
        let db = Database::open_in_memory().unwrap();
        db.insert("alice", &soup()).unwrap();
        assert!(db.remove("alice", "soup-1").unwrap());
        assert!(!db.remove("alice", "soup-1").unwrap());

        db.insert("alice", &soup()).unwrap();
        db.clear("alice").unwrap();
        assert!(db.list("alice").unwrap().is_empty());
    }

    #[test]
    fn test_plan_lazily_empty() {
        let db = Database::open_in_memory().unwrap();
        let plan = db.plan("nobody").unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.iter().count(), 7);
    }

    #[test]
    fn test_plan_order_and_removal() {
        let db = Database::open_in_memory().unwrap();
        db.append("alice", Weekday::Monday, "a").unwrap();
        db.append("alice", Weekday::Monday, "b").unwrap();
        db.append("alice", Weekday::Monday, "a").unwrap();
        db.append("alice", Weekday::Friday, "a").unwrap();

        let plan = db.plan("alice").unwrap();
        assert_eq!(plan.day(Weekday::Monday), ["a", "b", "a"]);

        assert!(db.remove_first("alice", Weekday::Monday, "a").unwrap());
        assert_eq!(db.plan("alice").unwrap().day(Weekday::Monday), ["b", "a"]);
        assert!(!db.remove_first("alice", Weekday::Tuesday, "a").unwrap());

        assert_eq!(db.remove_all("alice", "a").unwrap(), 2);
        let plan = db.plan("alice").unwrap();
        assert_eq!(plan.day(Weekday::Monday), ["b"]);
        assert!(plan.day(Weekday::Friday).is_empty());
    }

    #[test]
    fn test_replace_plan() {
        let db = Database::open_in_memory().unwrap();
        db.append("alice", Weekday::Monday, "old").unwrap();

        let mut plan = MealPlan::default();
        plan.day_mut(Weekday::Saturday).push("x".to_string());
        plan.day_mut(Weekday::Sunday).push("y".to_string());
        db.replace_plan("alice", &plan).unwrap();

        assert_eq!(db.plan("alice").unwrap(), plan);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mealplan.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert("alice", &soup()).unwrap();
            db.append("alice", Weekday::Wednesday, "soup-1").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list("alice").unwrap(), vec![soup()]);
        assert_eq!(db.plan("alice").unwrap().day(Weekday::Wednesday), ["soup-1"]);
    }

    #[test]
    fn test_delete_recipe_cascade() {
        let db = Database::open_in_memory().unwrap();
        db.insert("alice", &soup()).unwrap();
        db.insert("bob", &soup()).unwrap();
        db.append("alice", Weekday::Monday, "soup-1").unwrap();
        db.append("alice", Weekday::Monday, "other").unwrap();
        db.append("alice", Weekday::Thursday, "soup-1").unwrap();
        db.append("bob", Weekday::Monday, "soup-1").unwrap();

        assert_eq!(db.delete_recipe_cascade("alice", "soup-1").unwrap(), Some(2));
        assert!(db.get("alice", "soup-1").unwrap().is_none());
        assert_eq!(db.plan("alice").unwrap().day(Weekday::Monday), ["other"]);
        assert_eq!(db.plan("bob").unwrap().len(), 1);
        assert_eq!(db.delete_recipe_cascade("alice", "soup-1").unwrap(), None);
    }

    #[test]
    fn test_cascade_failure_keeps_recipe() {
        let db = Database::open_in_memory().unwrap();
        db.insert("alice", &soup()).unwrap();
        db.conn().execute_batch("DROP TABLE plan_entries").unwrap();

        assert!(db.delete_recipe_cascade("alice", "soup-1").is_err());
        assert_eq!(db.get("alice", "soup-1").unwrap().unwrap(), soup());
    }

    #[test]
    fn test_replace_all() {
        let db = Database::open_in_memory().unwrap();
        db.insert("alice", &soup()).unwrap();
        db.append("alice", Weekday::Monday, "soup-1").unwrap();

        let mut bread = soup();
        bread.id = "bread-1".to_string();
        bread.name = "Bread".to_string();
        let mut plan = MealPlan::default();
        plan.day_mut(Weekday::Saturday).push("bread-1".to_string());
        plan.day_mut(Weekday::Saturday).push("gone".to_string());
        db.replace_all("alice", &[bread.clone()], &plan).unwrap();

        assert_eq!(db.list("alice").unwrap(), vec![bread]);
        assert_eq!(db.plan("alice").unwrap(), plan);
    }

    #[test]
    fn test_replace_all_failure_keeps_old_data() {
        let db = Database::open_in_memory().unwrap();
        db.insert("alice", &soup()).unwrap();
        db.conn().execute_batch("DROP TABLE plan_entries").unwrap();

        let mut bread = soup();
        bread.id = "bread-1".to_string();
        assert!(db.replace_all("alice", &[bread], &MealPlan::default()).is_err());
        assert_eq!(db.list("alice").unwrap(), vec![soup()]);
    }

    #[test]
    fn test_busy_timeout_is_set() {
        let dir = tempfile::tempdir().unwrap();
        for db in [
            Database::open(&dir.path().join("mealplan.db")).unwrap(),
            Database::open_in_memory().unwrap(),
        ] {
            let ms: i64 = db
                .conn()
                .pragma_query_value(None, "busy_timeout", |row| row.get(0))
                .unwrap();
            assert_eq!(ms, 5000);
        }
    }
}
