//! Provider router: picks the LLM backend a request names.

use crate::openai_compat::OpenAiCompatProvider;
use agentwire_config::AppConfig;
use agentwire_core::error::ProviderError;
use agentwire_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;

/// Named providers plus the one used when a request names none.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider. Replaces any existing provider with the same name.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Look up `name`, or the default provider when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn Provider>, ProviderError> {
        let name = name.unwrap_or(&self.default_provider);
        self.get(name)
            .ok_or_else(|| ProviderError::NotConfigured(format!("unknown provider '{name}'")))
    }

    /// Registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Build a router holding every configured provider plus the default one.
///
/// Well-known names that are not configured explicitly are also registered
/// so a request may select them with just the shared API key.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.llm.provider);

    for (name, provider_config) in &config.providers {
        let base_url = provider_config
            .api_url
            .clone()
            .or_else(|| default_base_url(name).map(String::from));
        let Some(base_url) = base_url else {
            tracing::warn!(provider = %name, "Provider has no api_url and no known default; skipping");
            continue;
        };
        let api_key = config.api_key_for(name).unwrap_or_default();
        router.register(name.clone(), Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)));
    }

    let mut implicit: Vec<&str> = WELL_KNOWN.to_vec();
    implicit.push(&config.llm.provider);
    for name in implicit {
        if router.get(name).is_some() {
            continue;
        }
        if let Some(base_url) = default_base_url(name) {
            let api_key = config.api_key_for(name).unwrap_or_default();
            router.register(name, Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)));
        }
    }

    router
}

const WELL_KNOWN: &[&str] = &[
    "openrouter",
    "openai",
    "ollama",
    "deepseek",
    "groq",
    "together",
    "fireworks",
    "vllm",
    "llamacpp",
];

/// Base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> Option<&'static str> {
    Some(match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "openai" => "https://api.openai.com/v1",
        "ollama" => "http://localhost:11434/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "together" => "https://api.together.xyz/v1",
        "fireworks" => "https://api.fireworks.ai/inference/v1",
        "vllm" => "http://localhost:8000/v1",
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwire_config::ProviderConfig;

    #[test]
    fn resolve_defaults_and_named() {
        let mut router = ProviderRouter::new("openrouter");
        router.register("openrouter", Arc::new(OpenAiCompatProvider::openrouter("sk-test")));

        assert_eq!(router.resolve(None).unwrap().name(), "openrouter");
        assert!(router.resolve(Some("openrouter")).is_ok());
        let err = router.resolve(Some("nonexistent")).err().unwrap();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").unwrap().contains("openrouter.ai"));
        assert!(default_base_url("ollama").unwrap().contains("localhost:11434"));
        assert!(default_base_url("made-up").is_none());
    }

    #[test]
    fn build_from_default_config() {
        let router = build_from_config(&AppConfig::default());
        assert!(router.resolve(None).is_ok());
        assert!(router.list().contains(&"openai"));
    }

    #[test]
    fn custom_provider_needs_url() {
        let mut config = AppConfig::default();
        config.providers.insert("internal".into(), ProviderConfig::default());
        config.providers.insert(
            "lab".into(),
            ProviderConfig {
                api_url: Some("http://10.0.0.5:9000/v1".into()),
                ..Default::default()
            },
        );
        let router = build_from_config(&config);
        assert!(router.get("internal").is_none());
        assert!(router.get("lab").is_some());
    }
}
