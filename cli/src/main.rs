mod commands;
mod config;
mod server;
mod sessions;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    cmd_export, cmd_import, cmd_plan_assign, cmd_plan_show, cmd_plan_unassign, cmd_recipe_add,
    cmd_recipe_delete, cmd_recipe_edit, cmd_recipe_import, cmd_recipe_list, cmd_recipe_show,
    cmd_shopping,
};
use crate::config::Config;
use mealplan_core::Planner;
use mealplan_core::db::Database;

#[derive(Parser)]
#[command(
    name = "mealplan",
    version,
    about = "Plan the week's meals and get a shopping list"
)]
struct Cli {
    /// User whose recipes and plan local commands work on
    #[arg(long, global = true, env = "MEALPLAN_USER", default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Show or change the weekly plan
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Show the shopping list for the planned week
    Shopping {
        /// Output as CSV (name,quantity,unit)
        #[arg(long, conflicts_with = "json")]
        csv: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export recipes and plan as JSON
    Export {
        /// File to write (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace recipes and plan with the contents of an export file
    Import {
        /// Path to the export JSON file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Keep data in the SQLite database instead of in memory
        #[arg(long)]
        persist: bool,
        /// Emit log lines as JSON
        #[arg(long)]
        log_json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a new recipe
    Add {
        /// Recipe name
        name: String,
        /// Ingredient as "name quantity unit" (repeatable)
        #[arg(short, long = "ingredient", required = true)]
        ingredients: Vec<String>,
        /// Preparation instructions
        #[arg(short = 's', long)]
        instructions: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe (by ID or name)
    Show {
        /// Recipe ID or name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a recipe. Fields not given are kept
    Edit {
        /// Recipe ID or name
        recipe: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// Replacement ingredient list, "name quantity unit" (repeatable)
        #[arg(short, long = "ingredient")]
        ingredients: Vec<String>,
        /// New instructions
        #[arg(short = 's', long)]
        instructions: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe and remove it from the plan
    Delete {
        /// Recipe ID or name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a Cooklang (.cook) file
    Import {
        /// Path to the .cook file
        file: PathBuf,
        /// Recipe name override (defaults to metadata title or filename)
        #[arg(long)]
        name: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Show the week, today marked with *
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a recipe to a day
    Assign {
        /// Weekday: monday-sunday or mon-sun
        day: String,
        /// Recipe ID or name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove one occurrence of a recipe from a day
    Unassign {
        /// Weekday: monday-sunday or mon-sun
        day: String,
        /// Recipe ID or name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// `RUST_LOG` wins; otherwise `default_level`. Logs go to stderr so JSON
/// output on stdout stays clean.
fn init_tracing(log_json: bool, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { log_json, .. } => init_tracing(*log_json, "info"),
        _ => init_tracing(false, "warn"),
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            persist,
            ..
        } => {
            let planner = if persist {
                tracing::info!(path = %config.db_path.display(), "using SQLite storage");
                Planner::with_database(Database::open(&config.db_path)?)
            } else {
                tracing::info!("using in-memory storage; data is lost on exit");
                Planner::in_memory()
            };
            server::start_server(planner, port, &bind).await
        }
        command => {
            let planner = Planner::with_database(Database::open(&config.db_path)?);
            run_local(&planner, &cli.user, command)
        }
    }
}

fn run_local(planner: &Planner, user: &str, command: Commands) -> Result<()> {
    match command {
        Commands::Recipe { command } => match command {
            RecipeCommands::Add {
                name,
                ingredients,
                instructions,
                json,
            } => cmd_recipe_add(planner, user, &name, &ingredients, &instructions, json),
            RecipeCommands::List { json } => cmd_recipe_list(planner, user, json),
            RecipeCommands::Show { recipe, json } => cmd_recipe_show(planner, user, &recipe, json),
            RecipeCommands::Edit {
                recipe,
                name,
                ingredients,
                instructions,
                json,
            } => cmd_recipe_edit(
                planner,
                user,
                &recipe,
                name,
                &ingredients,
                instructions,
                json,
            ),
            RecipeCommands::Delete { recipe, json } => {
                cmd_recipe_delete(planner, user, &recipe, json)
            }
            RecipeCommands::Import { file, name, json } => {
                cmd_recipe_import(planner, user, &file, name, json)
            }
        },
        Commands::Plan { command } => match command {
            PlanCommands::Show { json } => cmd_plan_show(planner, user, json),
            PlanCommands::Assign { day, recipe, json } => {
                cmd_plan_assign(planner, user, &day, &recipe, json)
            }
            PlanCommands::Unassign { day, recipe, json } => {
                cmd_plan_unassign(planner, user, &day, &recipe, json)
            }
        },
        Commands::Shopping { csv, json } => cmd_shopping(planner, user, csv, json),
        Commands::Export { output } => cmd_export(planner, user, output.as_deref()),
        Commands::Import { file, json } => cmd_import(planner, user, &file, json),
        Commands::Serve { .. } => anyhow::bail!("serve is not a local command"),
    }
}
