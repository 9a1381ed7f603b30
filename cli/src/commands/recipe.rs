use anyhow::{Context, Result};
use std::path::Path;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mealplan_core::models::{Ingredient, RecipeInput};
use mealplan_core::planner::Planner;

use super::helpers::{
    format_ingredient_line, or_exit_not_found, parse_ingredient_lines, require_recipe, truncate,
};

pub(crate) fn cmd_recipe_add(
    planner: &Planner,
    user: &str,
    name: &str,
    ingredients: &[String],
    instructions: &str,
    json: bool,
) -> Result<()> {
    let ingredients = parse_ingredient_lines(ingredients.iter().map(String::as_str))?;
    let recipe = planner.create_recipe(user, RecipeInput::new(name, ingredients, instructions))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let id = &recipe.id;
        let name = &recipe.name;
        println!("Created recipe: {name} (id: {id})");
        println!("Plan it with: mealplan plan assign <day> \"{name}\"");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(planner: &Planner, user: &str, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Ingredients")]
        ingredients: usize,
    }

    let recipes = planner.list_recipes(user)?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id.clone(),
            name: truncate(&r.name, 30),
            ingredients: r.ingredients.len(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_recipe_show(planner: &Planner, user: &str, key: &str, json: bool) -> Result<()> {
    let recipe = require_recipe(planner, user, key, json)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
        return Ok(());
    }

    let name = &recipe.name;
    let id = &recipe.id;
    println!("=== {name} ===");
    println!("  ID: {id}\n");

    println!("  INGREDIENTS:");
    for ing in &recipe.ingredients {
        println!("    {}", format_ingredient_line(ing));
    }

    println!("\n  INSTRUCTIONS:");
    for line in recipe.instructions.lines() {
        println!("    {line}");
    }

    let planned: Vec<&str> = planner
        .plan(user)?
        .iter()
        .filter(|(_, ids)| ids.contains(&recipe.id))
        .map(|(day, _)| day.name())
        .collect();
    if !planned.is_empty() {
        println!("\n  PLANNED: {}", planned.join(", "));
    }

    Ok(())
}

/// Replace the fields that were given and keep the rest.
pub(crate) fn cmd_recipe_edit(
    planner: &Planner,
    user: &str,
    key: &str,
    name: Option<String>,
    ingredients: &[String],
    instructions: Option<String>,
    json: bool,
) -> Result<()> {
    let existing = require_recipe(planner, user, key, json)?;

    let ingredients = if ingredients.is_empty() {
        existing.ingredients
    } else {
        parse_ingredient_lines(ingredients.iter().map(String::as_str))?
    };
    let input = RecipeInput {
        name: Some(name.unwrap_or(existing.name)),
        ingredients: Some(ingredients),
        instructions: Some(instructions.unwrap_or(existing.instructions)),
    };

    let recipe = or_exit_not_found(planner.update_recipe(user, &existing.id, input), json)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let name = &recipe.name;
        println!("Updated recipe: {name}");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(planner: &Planner, user: &str, key: &str, json: bool) -> Result<()> {
    let recipe = require_recipe(planner, user, key, json)?;
    let removed = or_exit_not_found(planner.delete_recipe(user, &recipe.id), json)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "deleted": recipe.id, "unassigned": removed })
        );
    } else {
        let name = &recipe.name;
        match removed {
            0 => println!("Deleted recipe: {name}"),
            1 => println!("Deleted recipe: {name} (removed 1 plan entry)"),
            n => println!("Deleted recipe: {name} (removed {n} plan entries)"),
        }
    }
    Ok(())
}

pub(crate) fn cmd_recipe_import(
    planner: &Planner,
    user: &str,
    file: &Path,
    name_override: Option<String>,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let (recipe_data, _report) = cooklang::parse(&input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let name = name_override
        .or_else(|| recipe_data.metadata.title().map(String::from))
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe name. Use --name to specify one")?;

    let converter = cooklang::Converter::default();
    let ingredients: Vec<Ingredient> = recipe_data
        .group_ingredients(&converter)
        .iter()
        .map(cooklang_ingredient)
        .collect();

    let instructions = cooklang_instructions(&recipe_data);
    let recipe = planner.create_recipe(user, RecipeInput::new(&name, ingredients, &instructions))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let rname = &recipe.name;
        let ing_count = recipe.ingredients.len();
        let id = &recipe.id;
        println!("Imported recipe: {rname} ({ing_count} ingredients, id: {id})");
    }

    Ok(())
}

/// First quantity of a grouped ingredient. Missing or non-numeric amounts
/// count as one of the unit.
fn cooklang_ingredient(gi: &cooklang::ingredient_list::GroupedIngredient<'_>) -> Ingredient {
    let (quantity, unit) =
        gi.quantity
            .iter()
            .next()
            .map_or((1.0, String::new()), |qty: &cooklang::Quantity| {
                let value = match qty.value() {
                    cooklang::Value::Number(n) => n.value(),
                    cooklang::Value::Range { start, .. } => start.value(),
                    cooklang::Value::Text(t) => t.trim().parse().unwrap_or(1.0),
                };
                (value, qty.unit().map(String::from).unwrap_or_default())
            });

    Ingredient {
        name: gi.ingredient.display_name().to_string(),
        quantity,
        unit,
    }
}

/// Recipe body as plain text, one step or text block per line. Section
/// names get a line of their own. Comments and metadata never reach the
/// parsed sections.
fn cooklang_instructions(recipe: &cooklang::Recipe) -> String {
    let mut lines: Vec<String> = Vec::new();
    for section in &recipe.sections {
        let name = section.name.as_deref().map_or("", str::trim);
        if !name.is_empty() {
            lines.push(name.to_string());
        }
        for content in &section.content {
            let text = match content {
                cooklang::Content::Step(step) => step_text(recipe, &step.items),
                cooklang::Content::Text(text) => text.clone(),
            };
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                lines.push(text);
            }
        }
    }
    lines.join("\n")
}

fn step_text(recipe: &cooklang::Recipe, items: &[cooklang::Item]) -> String {
    let mut out = String::new();
    for item in items {
        match item {
            cooklang::Item::Text { value } => out.push_str(value),
            cooklang::Item::Ingredient { index } => {
                if let Some(ingredient) = recipe.ingredients.get(*index) {
                    out.push_str(&ingredient.display_name());
                }
            }
            cooklang::Item::Cookware { index } => {
                if let Some(cookware) = recipe.cookware.get(*index) {
                    out.push_str(&cookware.display_name());
                }
            }
            cooklang::Item::Timer { index } => {
                if let Some(timer) = recipe.timers.get(*index) {
                    let parts: Vec<String> = timer
                        .name
                        .iter()
                        .cloned()
                        .chain(timer.quantity.as_ref().map(quantity_text))
                        .collect();
                    out.push_str(&parts.join(" "));
                }
            }
            cooklang::Item::InlineQuantity { index } => {
                if let Some(quantity) = recipe.inline_quantities.get(*index) {
                    out.push_str(&quantity_text(quantity));
                }
            }
        }
    }
    out
}

fn quantity_text(qty: &cooklang::Quantity) -> String {
    match qty.unit() {
        Some(unit) => format!("{} {unit}", qty.value()),
        None => qty.value().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instructions_of(input: &str) -> String {
        let (recipe, _report) = cooklang::parse(input).into_result().unwrap();
        cooklang_instructions(&recipe)
    }

    #[test]
    fn test_cooklang_instructions() {
        let input = "\
>> servings: 2
-- a comment line
Boil @water{1%l} in a #pot{}.
Add @pasta{200%g}. -- trailing note

Drain and serve.
";
        assert_eq!(
            instructions_of(input),
            "Boil water in a pot. Add pasta.\nDrain and serve."
        );
    }

    #[test]
    fn test_cooklang_markup_reduced_to_names() {
        assert_eq!(
            instructions_of("Season with @salt and @black pepper{} in a #large bowl{}.\n"),
            "Season with salt and black pepper in a large bowl."
        );
        assert_eq!(instructions_of("Bake for ~{25%minutes}.\n"), "Bake for 25 minutes.");
    }

    #[test]
    fn test_cooklang_sections_and_block_comments() {
        let input = "\
== Dough ==
Mix @flour{200%g} [- sift first -] with @water{100%ml}.

== Topping ==
Spread @tomato sauce{100%ml}.
";
        let text = instructions_of(input);
        assert!(!text.contains("=="), "{text}");
        assert!(!text.contains("[-"), "{text}");
        assert!(!text.contains("sift"), "{text}");
        assert!(text.contains("Mix flour with water."), "{text}");
        assert!(text.contains("Spread tomato sauce."), "{text}");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first(), Some(&"Dough"));
        assert!(lines.contains(&"Topping"));
    }

    #[test]
    fn test_cooklang_front_matter_skipped() {
        let input = "---\ntitle: Toast\nservings: 1\n---\nToast @bread{2%slices}.\n";
        assert_eq!(instructions_of(input), "Toast bread.");
    }

    #[test]
    fn test_import_creates_recipe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pancakes.cook");
        std::fs::write(
            &path,
            "Whisk @flour{200%g}, @milk{300%ml} and @eggs{2}.\n\nFry in a #pan{}.\n",
        )
        .unwrap();

        let planner = Planner::in_memory();
        cmd_recipe_import(&planner, "local", &path, None, true).unwrap();

        let recipes = planner.list_recipes("local").unwrap();
        assert_eq!(recipes.len(), 1);
        let recipe = &recipes[0];
        assert_eq!(recipe.name, "pancakes");
        assert_eq!(recipe.instructions, "Whisk flour, milk and eggs.\nFry in a pan.");

        let flour = recipe.ingredients.iter().find(|i| i.name == "flour").unwrap();
        assert!((flour.quantity - 200.0).abs() < f64::EPSILON);
        assert_eq!(flour.unit, "g");
        let eggs = recipe.ingredients.iter().find(|i| i.name == "eggs").unwrap();
        assert!((eggs.quantity - 2.0).abs() < f64::EPSILON);
        assert!(eggs.unit.is_empty());
    }

    #[test]
    fn test_import_name_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.cook");
        std::fs::write(&path, "Toast @bread{2%slices}.\n").unwrap();

        let planner = Planner::in_memory();
        cmd_recipe_import(&planner, "local", &path, Some("Toast".to_string()), true).unwrap();
        assert_eq!(planner.list_recipes("local").unwrap()[0].name, "Toast");
    }

    #[test]
    fn test_edit_keeps_unspecified_fields() {
        let planner = Planner::in_memory();
        let soup = planner
            .create_recipe(
                "local",
                RecipeInput::new("Soup", vec![Ingredient::new("Carrot", 2.0, "pcs")], "Boil"),
            )
            .unwrap();

        cmd_recipe_edit(
            &planner,
            "local",
            "Soup",
            None,
            &[],
            Some("Simmer slowly".to_string()),
            true,
        )
        .unwrap();

        let updated = planner.get_recipe("local", &soup.id).unwrap();
        assert_eq!(updated.name, "Soup");
        assert_eq!(updated.ingredients, soup.ingredients);
        assert_eq!(updated.instructions, "Simmer slowly");
    }
}
