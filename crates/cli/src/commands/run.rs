//! `agentwire run`: send one request and stream the answer to stdout.
//!
//! Text is printed as it grows; tool events go to stderr. With `--raw`,
//! every structured message is printed as a JSON line instead.

use agentwire_agent::{AgentFactory, AgentRequest, EventBridge, ToolCache, ToolContext};
use agentwire_config::AppConfig;
use agentwire_core::ui_message::StructuredMessage;
use agentwire_tools::ToolkitRegistry;
use anyhow::Context;
use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub struct RunOptions {
    pub message: String,
    pub toolkits: Vec<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub raw: bool,
}

/// Tracks how much of the streamed text has been printed.
#[derive(Default)]
struct TextPrinter {
    printed: String,
}

impl TextPrinter {
    /// The part of `text` not yet printed; restarts when `text` is not a continuation.
    fn advance(&mut self, text: &str) -> String {
        let fresh = match text.strip_prefix(self.printed.as_str()) {
            Some(suffix) => suffix.to_string(),
            None => format!("\n{text}"),
        };
        self.printed = text.to_string();
        fresh
    }
}

pub async fn run(config_path: Option<&Path>, options: RunOptions) -> anyhow::Result<()> {
    let config = Arc::new(AppConfig::load_with(config_path).context("Failed to load config")?);
    let providers = agentwire_providers::build_from_config(&config);
    let factory = AgentFactory::new(config.clone(), providers, ToolkitRegistry::builtin());

    let request = AgentRequest {
        provider: options.provider,
        model: options.model,
        toolkits: (!options.toolkits.is_empty()).then_some(options.toolkits),
        ..AgentRequest::default()
    };
    let context = ToolContext::new().with_cache(Arc::new(ToolCache::with_ttl(config.tool_cache.ttl())));
    let agent = factory.build(&request, context)?;

    let mut bridge = EventBridge::new(agent);
    bridge.start(&options.message, None).await?;

    let mut stream = std::pin::pin!(bridge.into_stream());
    let mut printer = TextPrinter::default();
    let mut stdout = std::io::stdout();
    while let Some(item) = stream.next().await {
        let message = item?;
        if options.raw {
            writeln!(stdout, "{}", serde_json::to_string(&message)?)?;
            continue;
        }
        print_message(&message, &mut printer, &mut stdout)?;
    }
    if !options.raw {
        writeln!(stdout)?;
    }
    Ok(())
}

fn print_message(message: &StructuredMessage, printer: &mut TextPrinter, out: &mut impl Write) -> anyhow::Result<()> {
    for part in message.tool_parts() {
        match &part.error_text {
            Some(error) => eprintln!("[{} {}] {error}", part.tool_name, part.state.as_str()),
            None => eprintln!("[{} {}]", part.tool_name, part.state.as_str()),
        }
    }
    if let Some(text) = message.text_content() {
        write!(out, "{}", printer.advance(&text))?;
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printer_emits_only_new_text() {
        let mut printer = TextPrinter::default();
        assert_eq!(printer.advance("A"), "A");
        assert_eq!(printer.advance("AB"), "B");
        assert_eq!(printer.advance("AB"), "");
        assert_eq!(printer.advance("X"), "\nX");
    }
}
