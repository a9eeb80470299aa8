//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use budgetlens_core::BackendKind;
use clap::{Parser, Subcommand};

/// BudgetLens - Turn receipts and statements into budget data
#[derive(Parser)]
#[command(name = "budgetlens")]
#[command(about = "Analyze receipts and bank statements with a vision model", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Analyzer config file (defaults to the data dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Inference backend: gemini, openai_compatible, ollama, mock
    ///
    /// Overrides both the config file and AI_BACKEND.
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a receipt photo and print the draft expense
    Receipt {
        /// Receipt image (JPEG, PNG, GIF or WebP)
        image: PathBuf,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Analyze a bank statement PDF and print the classified lines
    Statement {
        /// Statement or budget document (PDF)
        pdf: PathBuf,

        /// Valid subcategories, comma separated (default: the whole taxonomy)
        #[arg(long, value_delimiter = ',')]
        subcategories: Vec<String>,

        /// File with one valid subcategory per line
        #[arg(long)]
        subcategories_file: Option<PathBuf>,

        /// Add up repeated subcategories in the budget plan (default: last line wins)
        #[arg(long)]
        sum: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the built-in category taxonomy
    Taxonomy {
        /// Print JSON instead of a tree
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved configuration and check the backend is reachable
    Check,

    /// Manage AI prompts (list, show, customize)
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all available prompts and their override status
    List,

    /// Show the content of a specific prompt
    Show {
        /// Prompt ID (e.g., analyze_receipt, classify_line_items)
        prompt_id: String,
    },

    /// Show the path where prompt overrides should be placed
    Path,
}
