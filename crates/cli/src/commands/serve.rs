//! `agentwire serve`: start the HTTP gateway.

use agentwire_config::AppConfig;
use anyhow::Context;
use std::path::Path;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load_with(config_path).context("Failed to load config")?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if config.llm.api_key.is_none() && config.llm.provider != "ollama" {
        tracing::warn!(
            provider = %config.llm.provider,
            "No API key configured; set AGENTWIRE_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY"
        );
    }

    println!("agentwire gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.llm.provider, config.llm.model);
    println!("   Toolkits:  {}", config.toolkits.default_toolkits.join(", "));

    agentwire_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("Gateway failed: {e}"))
}
