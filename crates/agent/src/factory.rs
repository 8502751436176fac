//! Per-request agent assembly.
//!
//! [`AgentFactory`] turns an [`AgentRequest`] into a ready-to-run
//! [`ReactLoop`]: provider and model resolution, toolkit loading, optional
//! sub-agents behind the delegation tool, and call tracking wired to the
//! loop's output queue. Every build produces fresh tools and loops.

use crate::delegation::{SubAgentRegistry, SubAgentTool};
use crate::react::ReactLoop;
use crate::tool_call::{ToolContext, wrap_tools_for_calls};
use agentwire_config::AppConfig;
use agentwire_core::agent::{LoopHandle, OutputSender, ReasoningLoop};
use agentwire_core::error::{Error, Result};
use agentwire_core::message::Message;
use agentwire_core::tool::Tool;
use agentwire_providers::ProviderRouter;
use agentwire_tools::{ToolkitRegistry, resolve_toolkits};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools when they help \
     answer the request and answer directly when they do not.";

/// A named sub-agent requested alongside the main agent.
///
/// Unset fields inherit from the parent request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubAgentSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolkits: Option<Vec<String>>,
}

/// Everything a request may override about the agent it runs against.
#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    pub system_prompt: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub toolkits: Option<Vec<String>>,
    pub sub_agents: Vec<SubAgentSpec>,
    /// Earlier turns of the conversation, oldest first
    pub history: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

pub struct AgentFactory {
    config: Arc<AppConfig>,
    providers: ProviderRouter,
    toolkits: ToolkitRegistry,
}

impl AgentFactory {
    pub fn new(config: Arc<AppConfig>, providers: ProviderRouter, toolkits: ToolkitRegistry) -> Self {
        Self {
            config,
            providers,
            toolkits,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderRouter {
        &self.providers
    }

    pub fn toolkits(&self) -> &ToolkitRegistry {
        &self.toolkits
    }

    /// Model for `provider` when the request names `model`.
    ///
    /// No model, or the gateway's model alias, means the provider's
    /// configured default.
    pub fn resolve_model(&self, provider: Option<&str>, model: Option<&str>) -> String {
        let requested = model
            .map(str::trim)
            .filter(|m| !m.is_empty() && *m != self.config.gateway.model_alias);
        if let Some(model) = requested {
            return model.to_string();
        }
        provider
            .filter(|p| *p != self.config.llm.provider)
            .and_then(|p| self.config.providers.get(p))
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| self.config.llm.model.clone())
    }

    /// Build the main agent for `request`, with `context` shared by all its tools.
    pub fn build(&self, request: &AgentRequest, context: ToolContext) -> Result<Arc<ReactLoop>> {
        let cancel = CancellationToken::new();
        let handle = LoopHandle::with_cancellation(cancel.clone());
        handle.set_step_timeout(self.config.agent.default_timeout());
        let sender = handle.sender();

        let provider_name = request.provider.as_deref();
        let provider = self.providers.resolve(provider_name)?;
        let model = self.resolve_model(provider_name, request.model.as_deref());
        let toolkit_names = resolve_toolkits(request.toolkits.as_deref(), &self.config.toolkits.default_toolkits);

        let mut tools = self.toolkits.load(&toolkit_names)?;
        if !request.sub_agents.is_empty() {
            let agents = self.build_sub_agents(request, &toolkit_names, &context, &sender, &cancel)?;
            let delegation = Arc::new(SubAgentTool::new(agents));
            delegation.attach_sink(sender.clone());
            tools.push(delegation);
        }

        let wrapped = wrap_tools_for_calls(tools, &context, self.config.agent.tool_timeout());
        wrapped.attach_sink(&sender);

        let base = request.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let system_prompt = compose_system_prompt(base, &wrapped.tools);

        info!(
            provider = provider.name(),
            model = %model,
            toolkits = ?toolkit_names,
            sub_agents = request.sub_agents.len(),
            tools = wrapped.tools.len(),
            "Building agent"
        );

        let agent = ReactLoop::new("main", provider, model)
            .with_handle(handle)
            .with_system_prompt(system_prompt)
            .with_history(request.history.clone())
            .with_temperature(request.temperature.unwrap_or(self.config.llm.temperature))
            .with_max_tokens(request.max_tokens.or(Some(self.config.llm.max_tokens)))
            .with_max_steps(self.config.agent.max_steps as usize)
            .with_tools(wrapped.tools);
        Ok(Arc::new(agent))
    }

    /// Sub-agents report tool events to the parent's queue and stop with it.
    fn build_sub_agents(
        &self,
        request: &AgentRequest,
        parent_toolkits: &[String],
        context: &ToolContext,
        parent: &OutputSender,
        cancel: &CancellationToken,
    ) -> Result<SubAgentRegistry> {
        let mut registry = SubAgentRegistry::new();
        let mut seen = HashSet::new();
        for spec in &request.sub_agents {
            let name = spec.name.trim();
            if name.is_empty() {
                return Err(Error::InvalidRequest("Sub-agent name must not be empty".into()));
            }
            if !seen.insert(name.to_string()) {
                return Err(Error::InvalidRequest(format!("Duplicate sub-agent: {name}")));
            }

            let provider_name = spec.provider.as_deref().or(request.provider.as_deref());
            let provider = self.providers.resolve(provider_name)?;
            let model = match spec.model.as_deref() {
                Some(model) => self.resolve_model(provider_name, Some(model)),
                None if spec.provider.is_none() => self.resolve_model(provider_name, request.model.as_deref()),
                None => self.resolve_model(provider_name, None),
            };
            let toolkit_names = resolve_toolkits(spec.toolkits.as_deref(), parent_toolkits);
            let tools = self.toolkits.load(&toolkit_names)?;
            let wrapped = wrap_tools_for_calls(tools, context, self.config.agent.tool_timeout());
            wrapped.attach_sink(parent);

            let base = spec.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT);
            let handle = LoopHandle::with_cancellation(cancel.child_token());
            handle.set_step_timeout(self.config.agent.default_timeout());
            let agent = ReactLoop::new(name, provider, model)
                .with_handle(handle)
                .with_system_prompt(compose_system_prompt(base, &wrapped.tools))
                .with_temperature(self.config.llm.temperature)
                .with_max_tokens(Some(self.config.llm.max_tokens))
                .with_max_steps(self.config.agent.sub_agent_max_steps as usize)
                .with_tools(wrapped.tools);
            registry.insert(name, Arc::new(agent) as Arc<dyn ReasoningLoop>);
        }
        Ok(registry)
    }
}

/// `base`, followed by a bullet list of the tools when there are any.
pub fn compose_system_prompt(base: &str, tools: &[Arc<dyn Tool>]) -> String {
    if tools.is_empty() {
        return base.to_string();
    }
    let listing: Vec<String> = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name(), t.description()))
        .collect();
    format!("{base}\n\nAvailable tools:\n{}", listing.join("\n"))
}
