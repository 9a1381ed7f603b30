use anyhow::Result;
use std::io;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mealplan_core::planner::Planner;
use mealplan_core::shopping;

use super::helpers::truncate;

pub(crate) fn cmd_shopping(planner: &Planner, user: &str, csv: bool, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: String,
    }

    let list = planner.shopping_list(user)?;

    if csv {
        return shopping::write_csv(&list, io::stdout().lock());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    if list.is_empty() {
        eprintln!("Nothing to buy. Assign recipes with: mealplan plan assign <day> <recipe>");
        return Ok(());
    }

    let rows: Vec<ItemRow> = list
        .iter()
        .map(|(name, item)| ItemRow {
            name: truncate(name, 30),
            quantity: format!("{}", item.quantity),
            unit: item.unit.clone(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
