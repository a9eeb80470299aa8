//! Receipt and statement analysis commands

use std::path::Path;

use anyhow::{Context, Result};
use budgetlens_core::{Analyzer, BudgetPlan, ClassifiedLineItem, MergeStrategy};
use chrono::Local;
use serde_json::json;

use super::{format_amount, truncate};

/// Analyze a receipt photo and print the draft expense
pub async fn cmd_receipt(analyzer: &Analyzer, path: &Path, json: bool) -> Result<()> {
    let image = std::fs::read(path)
        .with_context(|| format!("Failed to read receipt image: {}", path.display()))?;

    let receipt = analyzer
        .analyze_receipt(&image)
        .await
        .context("Receipt analysis failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
        return Ok(());
    }

    println!("Merchant:     {}", receipt.merchant);
    println!("Amount:       {}", format_amount(receipt.amount));
    match receipt.parsed_date() {
        Some(date) if date > Local::now().date_naive() => {
            println!("Date:         {} (in the future, check the receipt)", date)
        }
        Some(date) => println!("Date:         {}", date.format("%Y-%m-%d")),
        None => println!("Date:         {} (unrecognized)", receipt.date),
    }
    println!("Category:     {}", receipt.category);
    println!("Subcategory:  {}", receipt.subcategory);

    Ok(())
}

/// Analyze a statement PDF and print its classified lines and the budget plan
pub async fn cmd_statement(
    analyzer: &Analyzer,
    path: &Path,
    subcategories: &[String],
    sum: bool,
    json: bool,
) -> Result<()> {
    let pdf = std::fs::read(path)
        .with_context(|| format!("Failed to read statement: {}", path.display()))?;

    let valid = if subcategories.is_empty() {
        None
    } else {
        Some(subcategories)
    };
    let items = analyzer
        .analyze_budget_document(&pdf, valid)
        .await
        .context("Statement analysis failed")?;

    let strategy = if sum {
        MergeStrategy::Sum
    } else {
        MergeStrategy::Replace
    };
    let plan = BudgetPlan::from_items(&items, strategy);

    if json {
        let output = json!({
            "items": items,
            "plan": plan.amounts,
            "total": plan.total(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_statement(&items, &plan);
    Ok(())
}

fn print_statement(items: &[ClassifiedLineItem], plan: &BudgetPlan) {
    if items.is_empty() {
        println!("No budget lines found.");
        return;
    }

    println!("{:<40} {:>14}", "SUBCATEGORY", "AMOUNT");
    println!("{}", "-".repeat(55));
    for item in items {
        println!(
            "{:<40} {:>14}",
            truncate(&item.subcategory, 40),
            format_amount(item.amount)
        );
    }

    println!();
    println!("Budget plan:");
    for (subcategory, amount) in &plan.amounts {
        println!("  {:<38} {:>14}", truncate(subcategory, 38), format_amount(*amount));
    }
    println!("{}", "-".repeat(55));
    println!("  {:<38} {:>14}", "Total", format_amount(plan.total()));
}

/// Combine `--subcategories` with the lines of `--subcategories-file`
///
/// Blank lines and `#` comments in the file are skipped.
pub fn read_subcategories(from_args: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut subcategories: Vec<String> = from_args
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if let Some(file) = file {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read subcategories file: {}", file.display()))?;
        subcategories.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }

    Ok(subcategories)
}
