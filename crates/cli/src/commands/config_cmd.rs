//! `agentwire config`: configuration management commands.

use agentwire_config::AppConfig;
use anyhow::Context;
use std::path::{Path, PathBuf};

pub fn show(config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = AppConfig::load_with(config_path).context("Failed to load config")?;
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some("***".into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("***".into());
        }
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", resolved_path(config_path).display());
}

pub fn init() {
    print!("{}", AppConfig::default_toml());
}

pub fn validate(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = AppConfig::load_with(config_path).context("Config is invalid")?;

    let mut warnings = Vec::new();
    if config.llm.api_key.is_none() && config.llm.provider != "ollama" {
        warnings.push(format!("No API key set for provider '{}'", config.llm.provider));
    }
    let registry = agentwire_tools::ToolkitRegistry::builtin();
    for name in &config.toolkits.default_toolkits {
        if !registry.contains(name) {
            warnings.push(format!("Unknown default toolkit '{name}'"));
        }
    }

    println!("Config OK: {}", resolved_path(config_path).display());
    for warning in &warnings {
        println!("   warning: {warning}");
    }
    Ok(())
}

fn resolved_path(config_path: Option<&Path>) -> PathBuf {
    config_path.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let path = resolved_path(Some(Path::new("/etc/agentwire.toml")));
        assert_eq!(path, PathBuf::from("/etc/agentwire.toml"));
        assert!(resolved_path(None).to_str().unwrap().ends_with(".toml"));
    }
}
