use anyhow::{Context, Result};
use std::path::Path;

use mealplan_core::models::ExportData;
use mealplan_core::planner::Planner;

/// Write the user's recipes and raw plan as JSON, to `output` or stdout.
pub(crate) fn cmd_export(planner: &Planner, user: &str, output: Option<&Path>) -> Result<()> {
    let data = planner.export(user)?;
    let text = serde_json::to_string_pretty(&data)?;
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let count = data.recipes.len();
            eprintln!("Exported {count} recipes to {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

/// Replace the user's recipes and plan with the contents of an export file.
pub(crate) fn cmd_import(planner: &Planner, user: &str, file: &Path, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let data: ExportData = serde_json::from_str(&text)
        .with_context(|| format!("Invalid export file: {}", file.display()))?;

    let summary = planner.import(user, data)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let recipes = summary.recipes;
        let assignments = summary.assignments;
        println!("Imported {recipes} recipes and {assignments} plan entries");
        if summary.dangling > 0 {
            let dangling = summary.dangling;
            eprintln!(
                "Warning: {dangling} plan entries point at recipes that are not in the file; they show as \"Recipe Deleted\""
            );
        }
    }
    Ok(())
}
