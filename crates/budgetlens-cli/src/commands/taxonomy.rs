//! Taxonomy display

use anyhow::Result;
use budgetlens_core::Taxonomy;
use serde_json::{Map, Value};

/// Print the built-in category taxonomy
pub fn cmd_taxonomy(json: bool) -> Result<()> {
    let taxonomy = Taxonomy::builtin();

    if json {
        // Array of groups keeps category order
        let groups: Vec<Value> = taxonomy
            .groups()
            .iter()
            .map(|group| {
                let mut entry = Map::new();
                entry.insert("category".into(), Value::from(group.category.as_str()));
                entry.insert("subcategories".into(), Value::from(group.subcategories.clone()));
                Value::Object(entry)
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    for group in taxonomy.groups() {
        println!("{}", group.category);
        for subcategory in &group.subcategories {
            println!("  - {}", subcategory);
        }
    }
    println!();
    println!(
        "{} categories, {} subcategories",
        taxonomy.groups().len(),
        taxonomy.flatten().len()
    );

    Ok(())
}
