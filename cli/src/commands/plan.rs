use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use mealplan_core::models::Weekday;
use mealplan_core::planner::Planner;

use super::helpers::{or_exit_not_found, require_recipe, truncate};

pub(crate) fn cmd_plan_show(planner: &Planner, user: &str, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct DayRow {
        #[tabled(rename = "Day")]
        day: String,
        #[tabled(rename = "Meals")]
        meals: String,
    }

    let plan = planner.detailed_plan(user)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let today = Weekday::today();
    let rows: Vec<DayRow> = plan
        .iter()
        .map(|(day, meals)| DayRow {
            day: if day == today {
                format!("{day} *")
            } else {
                day.to_string()
            },
            meals: if meals.is_empty() {
                "-".to_string()
            } else {
                meals
                    .iter()
                    .map(|r| truncate(&r.name, 30))
                    .collect::<Vec<_>>()
                    .join(", ")
            },
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_plan_assign(
    planner: &Planner,
    user: &str,
    day: &str,
    recipe_key: &str,
    json: bool,
) -> Result<()> {
    let day = Weekday::parse_loose(day)?;
    let recipe = require_recipe(planner, user, recipe_key, json)?;
    or_exit_not_found(planner.assign(user, day.name(), &recipe.id), json)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "day": day, "recipeId": recipe.id })
        );
    } else {
        let name = &recipe.name;
        println!("Assigned {name} to {day}");
    }
    Ok(())
}

pub(crate) fn cmd_plan_unassign(
    planner: &Planner,
    user: &str,
    day: &str,
    recipe_key: &str,
    json: bool,
) -> Result<()> {
    let day = Weekday::parse_loose(day)?;
    // A recipe that was deleted is only reachable by id.
    let recipe_id = match super::helpers::find_recipe(planner, user, recipe_key)? {
        Some(recipe) => recipe.id,
        None => recipe_key.to_string(),
    };
    or_exit_not_found(planner.unassign(user, day.name(), &recipe_id), json)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "day": day, "recipeId": recipe_id })
        );
    } else {
        println!("Removed {recipe_key} from {day}");
    }
    Ok(())
}
