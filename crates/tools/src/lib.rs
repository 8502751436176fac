//! Toolkits and built-in tools for agentwire.
//!
//! Tools are grouped into named toolkits. A request names the toolkits it
//! wants (or falls back to the configured defaults) and the registry turns
//! those names into fresh tool instances.
//!
//! Built-in toolkits:
//! - `web`: `http_fetch`
//! - `utility`: `calculator`
//! - `test`: `test_echo`, `test_json_render`, `test_delay`, `test_error`, `test_session`

pub mod calculator;
pub mod http_fetch;
pub mod test_tools;

use agentwire_core::error::{Error, Result};
use agentwire_core::tool::Tool;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a fresh set of tools for one toolkit.
pub type ToolkitFactory = Arc<dyn Fn() -> Vec<Arc<dyn Tool>> + Send + Sync>;

/// Name → factory map of available toolkits.
#[derive(Clone, Default)]
pub struct ToolkitRegistry {
    toolkits: BTreeMap<String, ToolkitFactory>,
}

impl ToolkitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in toolkit.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("web", || vec![Arc::new(http_fetch::HttpFetchTool::new()) as Arc<dyn Tool>]);
        registry.register("utility", || vec![Arc::new(calculator::CalculatorTool) as Arc<dyn Tool>]);
        registry.register("test", || {
            vec![
                Arc::new(test_tools::EchoTool) as Arc<dyn Tool>,
                Arc::new(test_tools::JsonRenderTool),
                Arc::new(test_tools::DelayTool),
                Arc::new(test_tools::ErrorTool),
                Arc::new(test_tools::SessionTool),
            ]
        });
        registry
    }

    /// Register a toolkit. Replaces any existing toolkit with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Vec<Arc<dyn Tool>> + Send + Sync + 'static,
    {
        self.toolkits.insert(name.into(), Arc::new(factory));
    }

    pub fn names(&self) -> Vec<&str> {
        self.toolkits.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.toolkits.contains_key(name)
    }

    /// Instantiate the tools of every named toolkit, in the order given.
    ///
    /// Toolkit names are matched after trimming; blank names are ignored.
    pub fn load(&self, names: &[String]) -> Result<Vec<Arc<dyn Tool>>> {
        let mut tools = Vec::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let factory = self
                .toolkits
                .get(name)
                .ok_or_else(|| Error::InvalidRequest(format!("Unknown toolkit: {name}")))?;
            tools.extend(factory());
        }
        Ok(tools)
    }
}

/// The toolkits a request should use: its own list when given, else `defaults`.
pub fn resolve_toolkits(requested: Option<&[String]>, defaults: &[String]) -> Vec<String> {
    requested.unwrap_or(defaults).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builtin_toolkits_are_listed() {
        let registry = ToolkitRegistry::builtin();
        assert_eq!(registry.names(), vec!["test", "utility", "web"]);
    }

    #[test]
    fn load_preserves_requested_order() {
        let registry = ToolkitRegistry::builtin();
        let tools = registry.load(&names(&["utility", "web"])).unwrap();
        let loaded: Vec<_> = tools.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(loaded, vec!["calculator", "http_fetch"]);
    }

    #[test]
    fn unknown_toolkit_is_rejected() {
        let err = ToolkitRegistry::builtin()
            .load(&names(&["web", "defi"]))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(err.to_string().contains("Unknown toolkit: defi"));
    }

    #[test]
    fn each_load_builds_fresh_instances() {
        let registry = ToolkitRegistry::builtin();
        let a = registry.load(&names(&["utility"])).unwrap();
        let b = registry.load(&names(&["utility"])).unwrap();
        assert!(!Arc::ptr_eq(&a[0], &b[0]));
    }

    #[test]
    fn resolve_prefers_request_over_defaults() {
        let defaults = names(&["web"]);
        assert_eq!(resolve_toolkits(None, &defaults), defaults);
        assert_eq!(resolve_toolkits(Some(&names(&["test"])), &defaults), names(&["test"]));
        assert!(resolve_toolkits(Some(&[]), &defaults).is_empty());
    }

    #[test]
    fn only_session_tool_accepts_session_id() {
        let tools = ToolkitRegistry::builtin().load(&names(&["test"])).unwrap();
        let accepting: Vec<_> = tools
            .iter()
            .filter(|t| t.accepts_session_id())
            .map(|t| t.name())
            .collect();
        assert_eq!(accepting, vec!["test_session"]);
    }
}
