//! Prompts-related command implementations

use anyhow::Result;
use budgetlens_core::prompts::{default_prompts_dir, PromptId, PromptLibrary, PromptSource};

/// List all available prompts and their override status
pub fn cmd_prompts_list() -> Result<()> {
    let mut library = PromptLibrary::new();
    let prompts = library.list();

    println!("Available Prompts:\n");

    // Header
    println!(
        "{:<25} {:>7}  {:<26}  {}",
        "ID", "VERSION", "TASK TYPE", "OVERRIDE"
    );
    println!("{}", "-".repeat(75));

    for info in prompts {
        let override_status = match (&info.error, info.has_override()) {
            (Some(_), _) => "✗ Invalid",
            (None, true) => "✓ Custom",
            (None, false) => "Default",
        };

        println!(
            "{:<25} {:>7}  {:<26}  {}",
            info.id, info.version, info.task_type, override_status
        );
        if let Some(error) = info.error {
            println!("    {}", error);
        }
    }

    println!();
    println!(
        "Override directory: {}",
        default_prompts_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not available)".to_string())
    );

    println!();
    println!("To customize a prompt:");
    println!("  1. Save `budgetlens prompts show <id>` output minus the header as <id>.md");
    println!("  2. Place it in the override directory and edit it");
    println!("  3. Keep the frontmatter id and every {{{{variable}}}} the prompt needs");

    Ok(())
}

/// Show the content of a specific prompt
pub fn cmd_prompts_show(prompt_id: &str) -> Result<()> {
    let mut library = PromptLibrary::new();

    let Some(id) = PromptId::from_id(prompt_id) else {
        eprintln!("Unknown prompt ID: {}", prompt_id);
        eprintln!();
        eprintln!("Available prompts:");
        for id in PromptId::all() {
            eprintln!("  - {}", id.as_str());
        }
        return Ok(());
    };

    let prompt = library.get(id)?;

    println!("Prompt: {}", prompt.id.as_str());
    println!("Version: {}", prompt.version);
    println!("Task Type: {}", prompt.task_type.as_str());
    match &prompt.source {
        PromptSource::Embedded => println!("Source: Default"),
        PromptSource::Override(path) => {
            println!("Source: Override");
            println!("Override Path: {}", path.display());
        }
    }
    let required = id.required_vars();
    if !required.is_empty() {
        println!("Variables: {}", required.join(", "));
    }

    println!();
    println!("--- System ---");
    println!("{}", prompt.system);
    println!();
    println!("--- User ---");
    println!("{}", prompt.user);

    Ok(())
}

/// Show the path where prompt overrides should be placed
pub fn cmd_prompts_path() -> Result<()> {
    match default_prompts_dir() {
        Some(path) => {
            println!("{}", path.display());

            // Check if directory exists
            if !path.exists() {
                eprintln!();
                eprintln!("Note: This directory does not exist yet.");
                eprintln!("Create it to start adding custom prompts.");
            }
        }
        None => {
            eprintln!("Could not determine prompts directory.");
            eprintln!("The data directory is not available on this system.");
        }
    }

    Ok(())
}
