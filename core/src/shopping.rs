use std::io::Write;

use anyhow::{Context, Result};

use crate::models::{DetailedPlan, ShoppingItem, ShoppingList};

/// Sum ingredient quantities across every recipe occurrence in the plan.
///
/// Ingredients are keyed by exact name. The unit recorded for a name is the
/// one seen first; later occurrences only add their quantity, whatever unit
/// they carry. A recipe assigned twice counts twice.
#[must_use]
pub fn consolidate(plan: &DetailedPlan) -> ShoppingList {
    let mut list = ShoppingList::new();
    for (_, meals) in plan.iter() {
        for recipe in meals {
            for ingredient in &recipe.ingredients {
                list.entry(ingredient.name.clone())
                    .and_modify(|item| item.quantity += ingredient.quantity)
                    .or_insert_with(|| ShoppingItem {
                        quantity: ingredient.quantity,
                        unit: ingredient.unit.clone(),
                    });
            }
        }
    }
    list
}

/// Write the list as `name,quantity,unit` rows with a header.
pub fn write_csv<W: Write>(list: &ShoppingList, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["name", "quantity", "unit"])?;
    for (name, item) in list {
        wtr.write_record([
            name.as_str(),
            item.quantity.to_string().as_str(),
            item.unit.as_str(),
        ])
        .with_context(|| format!("Failed to write row for '{name}'"))?;
    }
    wtr.flush()?;
    Ok(())
}
