//! Configuration and backend health check

use std::path::Path;

use anyhow::Result;
use budgetlens_core::{AnalyzerConfig, BackendKind, InferenceBackend, InferenceClient};

/// Show the resolved configuration and probe the backend
pub async fn cmd_check(config: Option<&Path>, backend: Option<BackendKind>) -> Result<()> {
    let config = AnalyzerConfig::resolve(config, backend)?;
    let client = InferenceClient::from_config(&config)?;
    print_check(&config, &client).await;
    Ok(())
}

pub(crate) async fn print_check(config: &AnalyzerConfig, client: &InferenceClient) -> bool {
    let info = client.info();

    println!("BudgetLens Configuration\n");
    println!(
        "  Config file:  {}",
        config
            .source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(embedded defaults)".to_string())
    );
    println!("  Backend:      {}", info.kind);
    println!("  Host:         {}", info.host);
    println!("  Model:        {}", info.default_model);
    for (task, model) in &info.task_models {
        println!("    {:<24} {}", task, model);
    }
    println!("  Timeout:      {}s", config.timeout.as_secs());

    if config.backend == BackendKind::Gemini && config.api_key.is_none() {
        println!();
        println!("  ⚠ GEMINI_API_KEY is not set; analysis requests will fail.");
    }

    println!();
    let healthy = client.health_check().await;
    if healthy {
        println!("  ✓ Backend is reachable");
    } else {
        println!("  ✗ Backend is not reachable at {}", info.host);
    }
    healthy
}
