use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};

/// Name carried by the placeholder that stands in for a deleted recipe.
pub const DELETED_RECIPE_NAME: &str = "Recipe Deleted";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
}

impl Ingredient {
    pub fn new(name: &str, quantity: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            quantity,
            unit: unit.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_ingredients")]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub instructions: String,
}

impl Recipe {
    /// Recipe-shaped stand-in for an id that no longer resolves.
    #[must_use]
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: DELETED_RECIPE_NAME.to_string(),
            ingredients: Vec::new(),
            instructions: String::new(),
        }
    }
}

/// Accepts whatever sits in `ingredients`: anything but an array becomes an
/// empty list, and array items that are not ingredients are dropped.
fn lenient_ingredients<'de, D>(deserializer: D) -> Result<Vec<Ingredient>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Unvalidated create/update payload. Every field is optional so that a
/// missing field surfaces as a validation failure instead of a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeInput {
    pub name: Option<String>,
    pub ingredients: Option<Vec<Ingredient>>,
    pub instructions: Option<String>,
}

/// A payload that passed [`RecipeInput::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecipe {
    pub name: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: String,
}

impl NewRecipe {
    #[must_use]
    pub fn into_recipe(self, id: String) -> Recipe {
        Recipe {
            id,
            name: self.name,
            ingredients: self.ingredients,
            instructions: self.instructions,
        }
    }
}

impl RecipeInput {
    pub fn new(name: &str, ingredients: Vec<Ingredient>, instructions: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ingredients: Some(ingredients),
            instructions: Some(instructions.to_string()),
        }
    }

    pub fn validate(self) -> PlanResult<NewRecipe> {
        let name = required_text(self.name, "name")?;
        let instructions = required_text(self.instructions, "instructions")?;
        let ingredients = match self.ingredients {
            Some(list) if !list.is_empty() => list,
            _ => return Err(PlanError::validation("ingredients must not be empty")),
        };
        let ingredients = ingredients
            .into_iter()
            .map(validate_ingredient)
            .collect::<PlanResult<Vec<_>>>()?;
        Ok(NewRecipe {
            name,
            ingredients,
            instructions,
        })
    }
}

fn required_text(value: Option<String>, field: &str) -> PlanResult<String> {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if value.is_empty() {
        return Err(PlanError::validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

pub fn validate_ingredient(ingredient: Ingredient) -> PlanResult<Ingredient> {
    let name = ingredient.name.trim().to_string();
    if name.is_empty() {
        return Err(PlanError::validation("ingredient name must not be empty"));
    }
    if !ingredient.quantity.is_finite() || ingredient.quantity < 0.0 {
        return Err(PlanError::validation(format!(
            "ingredient '{name}' quantity must be a non-negative number"
        )));
    }
    Ok(Ingredient {
        name,
        quantity: ingredient.quantity,
        unit: ingredient.unit.trim().to_string(),
    })
}

// --- Weekdays ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Sunday,
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Weekday::Sunday => "Sunday",
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
        }
    }

    /// Position in the week, Sunday = 0.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn today() -> Self {
        use chrono::Datelike;
        chrono::Local::now().weekday().into()
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Sun => Weekday::Sunday,
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Weekday {
    /// Forgiving form for typed input: ignores case and surrounding space,
    /// and takes three-letter abbreviations.
    pub fn parse_loose(s: &str) -> Result<Self, PlanError> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|day| {
                let name = day.name().to_lowercase();
                lower == name || lower == name[..3]
            })
            .ok_or_else(|| PlanError::InvalidDay(s.to_string()))
    }
}

/// Only the seven capitalised day names are accepted.
impl FromStr for Weekday {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|day| day.name() == s)
            .ok_or_else(|| PlanError::InvalidDay(s.to_string()))
    }
}

impl Serialize for Weekday {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Weekday {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// --- Plans ---

/// Seven ordered slots, one per weekday. Serialises as a map keyed by day
/// name, Sunday first.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekTable<T> {
    days: [Vec<T>; 7],
}

/// Raw plan: recipe ids per day, in assignment order.
pub type MealPlan = WeekTable<String>;

/// Plan with every id resolved to a recipe or a placeholder.
pub type DetailedPlan = WeekTable<Recipe>;

impl<T> Default for WeekTable<T> {
    fn default() -> Self {
        Self {
            days: std::array::from_fn(|_| Vec::new()),
        }
    }
}

impl<T> WeekTable<T> {
    #[must_use]
    pub fn day(&self, day: Weekday) -> &[T] {
        &self.days[day.index()]
    }

    pub fn day_mut(&mut self, day: Weekday) -> &mut Vec<T> {
        &mut self.days[day.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Weekday, &[T])> {
        Weekday::ALL
            .into_iter()
            .map(move |day| (day, self.days[day.index()].as_slice()))
    }

    /// Number of entries across the whole week.
    #[must_use]
    pub fn len(&self) -> usize {
        self.days.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> WeekTable<U> {
        WeekTable {
            days: std::array::from_fn(|i| self.days[i].iter().map(&mut f).collect()),
        }
    }
}

impl<T: Serialize> Serialize for WeekTable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.days.len()))?;
        for (day, entries) in self.iter() {
            map.serialize_entry(day.name(), entries)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for WeekTable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Vec<T>>::deserialize(deserializer)?;
        let mut table = Self::default();
        for (key, entries) in raw {
            let day: Weekday = key.parse().map_err(de::Error::custom)?;
            table.day_mut(day).extend(entries);
        }
        Ok(table)
    }
}

// --- Shopping list ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    pub quantity: f64,
    pub unit: String,
}

/// Ingredient name to aggregated amount. Callers must not rely on the
/// iteration order.
pub type ShoppingList = BTreeMap<String, ShoppingItem>;

// --- Export / Import ---

pub const EXPORT_VERSION: u32 = 1;

fn default_export_version() -> u32 {
    EXPORT_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    #[serde(default = "default_export_version")]
    pub version: u32,
    #[serde(default)]
    pub recipes: Vec<Recipe>,
    #[serde(default)]
    pub plan: MealPlan,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub recipes: usize,
    pub assignments: usize,
    /// Assignments whose recipe id is not among the imported recipes.
    pub dangling: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_complete_input() {
        let input = RecipeInput::new(
            "  Soup ",
            vec![Ingredient::new(" Carrot ", 2.0, " pcs ")],
            "Boil",
        );
        let recipe = input.validate().unwrap();
        assert_eq!(recipe.name, "Soup");
        assert_eq!(recipe.ingredients, vec![Ingredient::new("Carrot", 2.0, "pcs")]);
        assert_eq!(recipe.instructions, "Boil");
    }

    #[test]
    fn test_validate_missing_fields() {
        let full = RecipeInput::new("Soup", vec![Ingredient::new("Carrot", 2.0, "pcs")], "Boil");

        let mut missing_name = full.clone();
        missing_name.name = None;
        assert!(matches!(missing_name.validate(), Err(PlanError::Validation(_))));

        let mut blank_name = full.clone();
        blank_name.name = Some("   ".to_string());
        assert!(matches!(blank_name.validate(), Err(PlanError::Validation(_))));

        let mut missing_ingredients = full.clone();
        missing_ingredients.ingredients = None;
        assert!(matches!(
            missing_ingredients.validate(),
            Err(PlanError::Validation(_))
        ));

        let mut empty_ingredients = full.clone();
        empty_ingredients.ingredients = Some(vec![]);
        assert!(matches!(
            empty_ingredients.validate(),
            Err(PlanError::Validation(_))
        ));

        let mut missing_instructions = full;
        missing_instructions.instructions = None;
        assert!(matches!(
            missing_instructions.validate(),
            Err(PlanError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_ingredient_quantity() {
        assert!(validate_ingredient(Ingredient::new("Salt", 0.0, "g")).is_ok());
        assert!(validate_ingredient(Ingredient::new("Salt", -1.0, "g")).is_err());
        assert!(validate_ingredient(Ingredient::new("Salt", f64::NAN, "g")).is_err());
        assert!(validate_ingredient(Ingredient::new("", 1.0, "g")).is_err());
        // Unit is optional
        assert!(validate_ingredient(Ingredient::new("Egg", 3.0, "")).is_ok());
    }

    #[test]
    fn test_weekday_parse() {
        for day in Weekday::ALL {
            assert_eq!(day.name().parse::<Weekday>().unwrap(), day);
        }
    }

    #[test]
    fn test_weekday_parse_invalid() {
        let err = "Someday".parse::<Weekday>().unwrap_err();
        assert!(matches!(err, PlanError::InvalidDay(ref d) if d == "Someday"));
        assert!("".parse::<Weekday>().is_err());
        assert!("mo".parse::<Weekday>().is_err());
        assert!("monday".parse::<Weekday>().is_err());
        assert!("Mon".parse::<Weekday>().is_err());
        assert!("MONDAY".parse::<Weekday>().is_err());
        assert!(" Sunday ".parse::<Weekday>().is_err());
    }

    #[test]
    fn test_weekday_parse_loose() {
        assert_eq!(Weekday::parse_loose("Monday").unwrap(), Weekday::Monday);
        assert_eq!(Weekday::parse_loose("monday").unwrap(), Weekday::Monday);
        assert_eq!(Weekday::parse_loose("SAT").unwrap(), Weekday::Saturday);
        assert_eq!(Weekday::parse_loose(" Sunday ").unwrap(), Weekday::Sunday);
        assert!(Weekday::parse_loose("mo").is_err());
        assert!(Weekday::parse_loose("Someday").is_err());
    }

    #[test]
    fn test_weekday_index_roundtrip() {
        for day in Weekday::ALL {
            assert_eq!(Weekday::from_index(day.index()), Some(day));
        }
        assert_eq!(Weekday::from_index(7), None);
        assert_eq!(Weekday::from(chrono::Weekday::Sun), Weekday::Sunday);
        assert_eq!(Weekday::from(chrono::Weekday::Wed), Weekday::Wednesday);
    }

    #[test]
    fn test_week_table_serializes_sunday_first() {
        let mut plan = MealPlan::default();
        plan.day_mut(Weekday::Monday).push("a".to_string());

        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.starts_with("{\"Sunday\":[],\"Monday\":[\"a\"]"));
        assert!(json.ends_with("\"Saturday\":[]}"));
    }

    #[test]
    fn test_week_table_deserialize_partial() {
        let plan: MealPlan = serde_json::from_str(r#"{"Friday": ["x", "x"]}"#).unwrap();
        assert_eq!(plan.day(Weekday::Friday), ["x", "x"]);
        assert!(plan.day(Weekday::Monday).is_empty());
        assert_eq!(plan.len(), 2);

        assert!(serde_json::from_str::<MealPlan>(r#"{"Someday": []}"#).is_err());
    }

    #[test]
    fn test_week_table_map() {
        let mut plan = MealPlan::default();
        plan.day_mut(Weekday::Tuesday).push("abc".to_string());
        let lengths = plan.map(String::len);
        assert_eq!(lengths.day(Weekday::Tuesday), [3]);
        assert!(MealPlan::default().is_empty());
    }

    #[test]
    fn test_recipe_lenient_ingredients() {
        let recipe: Recipe = serde_json::from_str(
            r#"{"id": "1", "name": "Odd", "ingredients": "not a list", "instructions": "x"}"#,
        )
        .unwrap();
        assert!(recipe.ingredients.is_empty());

        let recipe: Recipe = serde_json::from_str(
            r#"{"id": "2", "name": "Mixed", "ingredients": [
                {"name": "Flour", "quantity": 2, "unit": "cups"},
                {"name": "Broken"},
                42
            ]}"#,
        )
        .unwrap();
        assert_eq!(recipe.ingredients, vec![Ingredient::new("Flour", 2.0, "cups")]);
        assert_eq!(recipe.instructions, "");
    }

    #[test]
    fn test_placeholder() {
        let p = Recipe::placeholder("gone");
        assert_eq!(p.id, "gone");
        assert_eq!(p.name, DELETED_RECIPE_NAME);
        assert!(p.ingredients.is_empty());
    }
}
