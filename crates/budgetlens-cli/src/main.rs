//! BudgetLens CLI - Receipt and statement analyzer
//!
//! Usage:
//!   budgetlens receipt ticket.jpg          Analyze a receipt photo
//!   budgetlens statement estado.pdf        Classify a statement into subcategories
//!   budgetlens taxonomy                    Show the category taxonomy
//!   budgetlens check                       Check the configured backend

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Receipt { image, json } => {
            let analyzer = commands::load_analyzer(config_path, cli.backend)?;
            commands::cmd_receipt(&analyzer, &image, json).await
        }
        Commands::Statement {
            pdf,
            subcategories,
            subcategories_file,
            sum,
            json,
        } => {
            let analyzer = commands::load_analyzer(config_path, cli.backend)?;
            let valid = commands::read_subcategories(&subcategories, subcategories_file.as_deref())?;
            commands::cmd_statement(&analyzer, &pdf, &valid, sum, json).await
        }
        Commands::Taxonomy { json } => commands::cmd_taxonomy(json),
        Commands::Check => commands::cmd_check(config_path, cli.backend).await,
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
    }
}
