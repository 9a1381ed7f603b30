use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::process;

use mealplan_core::PlanResult;
use mealplan_core::models::{Ingredient, Recipe};
use mealplan_core::planner::Planner;

/// Parse one `"name quantity unit"` line. The name may span several words;
/// it ends at the first token that reads as a number. The unit is optional.
pub(crate) fn parse_ingredient_line(line: &str) -> Result<Ingredient> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let qty_idx = tokens
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, t)| t.parse::<f64>().is_ok())
        .map(|(i, _)| i)
        .with_context(|| {
            format!("Invalid ingredient '{line}'. Use 'name quantity unit', e.g. 'flour 2 cups'")
        })?;

    let quantity: f64 = tokens[qty_idx].parse()?;
    if !quantity.is_finite() || quantity < 0.0 {
        bail!("Invalid quantity in '{line}'. Use a non-negative number");
    }
    Ok(Ingredient {
        name: tokens[..qty_idx].join(" "),
        quantity,
        unit: tokens[qty_idx + 1..].join(" "),
    })
}

/// Parse a block of ingredient lines, skipping blank ones.
pub(crate) fn parse_ingredient_lines<'a>(
    lines: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<Ingredient>> {
    lines
        .into_iter()
        .flat_map(str::lines)
        .filter(|l| !l.trim().is_empty())
        .map(parse_ingredient_line)
        .collect()
}

pub(crate) fn format_ingredient_line(ingredient: &Ingredient) -> String {
    let name = &ingredient.name;
    let quantity = ingredient.quantity;
    let unit = &ingredient.unit;
    format!("{name} {quantity} {unit}").trim_end().to_string()
}

/// Find a recipe by id, falling back to an exact (case-insensitive) name.
pub(crate) fn find_recipe(planner: &Planner, user: &str, key: &str) -> Result<Option<Recipe>> {
    let recipes = planner.list_recipes(user)?;
    if let Some(recipe) = recipes.iter().find(|r| r.id == key) {
        return Ok(Some(recipe.clone()));
    }
    let mut by_name = recipes
        .into_iter()
        .filter(|r| r.name.eq_ignore_ascii_case(key));
    let first = by_name.next();
    if by_name.next().is_some() {
        bail!("Several recipes are named '{key}'. Use the recipe ID instead");
    }
    Ok(first)
}

/// Like [`find_recipe`], but a miss ends the process with status 2.
pub(crate) fn require_recipe(planner: &Planner, user: &str, key: &str, json: bool) -> Result<Recipe> {
    match find_recipe(planner, user, key)? {
        Some(recipe) => Ok(recipe),
        None => exit_not_found(&format!("Recipe '{key}' not found"), json),
    }
}

/// Unwrap a planner result, turning "not found" outcomes into exit status 2.
pub(crate) fn or_exit_not_found<T>(result: PlanResult<T>, json: bool) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err) if err.is_not_found() => exit_not_found(&err.to_string(), json),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealplan_core::models::RecipeInput;

    #[test]
    fn test_parse_ingredient_line() {
        let ing = parse_ingredient_line("flour 2 cups").unwrap();
        assert_eq!(ing, Ingredient::new("flour", 2.0, "cups"));
    }

    #[test]
    fn test_parse_ingredient_multi_word() {
        let ing = parse_ingredient_line("  olive oil 1.5 tbsp ").unwrap();
        assert_eq!(ing, Ingredient::new("olive oil", 1.5, "tbsp"));

        let ing = parse_ingredient_line("brown sugar 100 g packed").unwrap();
        assert_eq!(ing.name, "brown sugar");
        assert_eq!(ing.unit, "g packed");
    }

    #[test]
    fn test_parse_ingredient_without_unit() {
        let ing = parse_ingredient_line("eggs 3").unwrap();
        assert_eq!(ing, Ingredient::new("eggs", 3.0, ""));
    }

    #[test]
    fn test_parse_ingredient_invalid() {
        assert!(parse_ingredient_line("salt").is_err());
        assert!(parse_ingredient_line("salt a pinch").is_err());
        assert!(parse_ingredient_line("2 cups").is_err());
        assert!(parse_ingredient_line("salt -1 tsp").is_err());
        assert!(parse_ingredient_line("").is_err());
    }

    #[test]
    fn test_parse_ingredient_lines_skips_blanks() {
        let list = parse_ingredient_lines(["flour 2 cups\n\n  \neggs 3", "milk 1 cup"]).unwrap();
        assert_eq!(
            list,
            vec![
                Ingredient::new("flour", 2.0, "cups"),
                Ingredient::new("eggs", 3.0, ""),
                Ingredient::new("milk", 1.0, "cup"),
            ]
        );
    }

    #[test]
    fn test_format_is_inverse_of_parse() {
        for line in ["flour 2 cups", "eggs 3", "olive oil 0.5 tbsp"] {
            let ing = parse_ingredient_line(line).unwrap();
            assert_eq!(format_ingredient_line(&ing), line);
        }
    }

    #[test]
    fn test_find_recipe_by_id_or_name() {
        let planner = Planner::in_memory();
        let soup = planner
            .create_recipe(
                "local",
                RecipeInput::new("Tomato Soup", vec![Ingredient::new("tomato", 4.0, "")], "Blend"),
            )
            .unwrap();

        let by_id = find_recipe(&planner, "local", &soup.id).unwrap().unwrap();
        assert_eq!(by_id.id, soup.id);
        let by_name = find_recipe(&planner, "local", "tomato soup").unwrap().unwrap();
        assert_eq!(by_name.id, soup.id);
        assert!(find_recipe(&planner, "local", "Stew").unwrap().is_none());
        assert!(find_recipe(&planner, "other", &soup.id).unwrap().is_none());
    }

    #[test]
    fn test_find_recipe_ambiguous_name() {
        let planner = Planner::in_memory();
        for _ in 0..2 {
            planner
                .create_recipe(
                    "local",
                    RecipeInput::new("Toast", vec![Ingredient::new("bread", 1.0, "slice")], "Toast"),
                )
                .unwrap();
        }
        assert!(find_recipe(&planner, "local", "Toast").is_err());
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("nope"), r#"{"error":"nope"}"#);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }
}
