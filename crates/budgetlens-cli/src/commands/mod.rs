//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `analyze` - Receipt and statement analysis
//! - `check` - Configuration and backend health
//! - `prompts` - Prompt library management commands
//! - `taxonomy` - Category taxonomy display

pub mod analyze;
pub mod check;
pub mod prompts;
pub mod taxonomy;

// Re-export command functions for main.rs
pub use analyze::*;
pub use check::*;
pub use prompts::*;
pub use taxonomy::*;

use std::path::Path;

use anyhow::{Context, Result};
use budgetlens_core::{Analyzer, AnalyzerConfig, BackendKind};

/// Resolve configuration and build the analyzer
pub fn load_analyzer(config: Option<&Path>, backend: Option<BackendKind>) -> Result<Analyzer> {
    let config =
        AnalyzerConfig::resolve(config, backend).context("Failed to load analyzer configuration")?;
    tracing::debug!(
        backend = %config.backend,
        host = %config.host,
        source = ?config.source,
        "Loaded analyzer configuration"
    );
    Analyzer::from_config(&config).context("Failed to create inference client")
}

/// Format an amount as `$1,234.50`
pub fn format_amount(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
