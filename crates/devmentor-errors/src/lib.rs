//! User-facing errors for the DevMentor CLI.
//!
//! Every failure the user sees is rendered as a title, a message and a short
//! list of remediation steps, prefixed by a glyph for its category.

use anyhow::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedError {
    pub title: String,
    pub message: String,
    pub suggestions: Vec<String>,
    pub error_type: ErrorType,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Missing API key, invalid settings.
    Configuration,
    /// A listener is down or did not answer.
    Server,
    /// Timeouts and refused connections.
    Network,
    /// Error content returned by a persona or the tool server.
    Agent,
    /// Bad user input: unknown persona, malformed tool arguments.
    Validation,
    Unknown,
}

impl EnhancedError {
    pub fn new(title: impl Into<String>, message: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            suggestions: Vec::new(),
            error_type,
            context: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions.extend(suggestions.into_iter().map(Into::into));
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn into_error(self) -> Error {
        Error::new(self)
    }

    /// Multi-line rendering; `verbose` adds the context block.
    pub fn format(&self, verbose: bool) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "{} {}", self.error_type.glyph(), self.title);
        let _ = writeln!(output, "  {}", self.message);

        if verbose && let Some(context) = &self.context {
            let _ = writeln!(output, "\n  Context: {context}");
        }

        if !self.suggestions.is_empty() {
            output.push_str("\n  Fix:\n");
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                let _ = writeln!(output, "    {}. {suggestion}", i + 1);
            }
        }
        output
    }
}

impl ErrorType {
    pub fn glyph(self) -> &'static str {
        match self {
            ErrorType::Configuration => "🔧",
            ErrorType::Server => "❌",
            ErrorType::Network => "🌐",
            ErrorType::Agent => "🤖",
            ErrorType::Validation => "📋",
            ErrorType::Unknown => "❓",
        }
    }
}

impl fmt::Display for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

impl std::error::Error for EnhancedError {}

/// Renders any error, classifying plain ones by their message.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorHandler {
    verbose: bool,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn handle(&self, error: &Error) -> String {
        if let Some(enhanced) = error.downcast_ref::<EnhancedError>() {
            return enhanced.format(self.verbose);
        }
        self.classify(&format!("{error:#}")).format(self.verbose)
    }

    fn classify(&self, message: &str) -> EnhancedError {
        let lower = message.to_lowercase();

        if lower.contains("api key") || lower.contains("api_key") || lower.contains("settings") {
            return EnhancedError::new("Configuration Error", message, ErrorType::Configuration)
                .with_suggestions([
                    "Check .devmentor/settings.json",
                    "Set the OPENROUTER_API_KEY environment variable or add it to .env",
                ]);
        }

        if lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("unreachable")
            || lower.contains("connect")
        {
            return EnhancedError::new("Network Error", message, ErrorType::Network)
                .with_suggestions([
                    "Run `devmentor diagnose` to see which listeners are up",
                    "Start the servers with `devmentor serve`",
                ]);
        }

        if lower.contains("unknown persona") || lower.contains("unknown tool") || lower.contains("invalid") {
            return EnhancedError::new("Invalid Input", message, ErrorType::Validation)
                .with_suggestion("Run `devmentor personas` or `devmentor tool --help` for valid names");
        }

        EnhancedError::new("Error", message, ErrorType::Unknown)
            .with_suggestion("Re-run with -v for debug logs")
    }
}

/// Constructors for the failures the CLI reports most often.
pub mod errors {
    use super::*;

    pub fn server_not_running(port: u16, cause: &str) -> EnhancedError {
        EnhancedError::new(
            "Server is not running",
            format!("The agent on port {port} is not responding."),
            ErrorType::Server,
        )
        .with_context(format!("Cause: {cause}"))
        .with_suggestions([
            "Run `devmentor serve` in a separate terminal",
            "Wait a few seconds for the servers to start",
            "Check the `devmentor serve` output for startup errors",
        ])
    }

    pub fn agent_error(port: u16, message: &str) -> EnhancedError {
        EnhancedError::new(
            format!("Error communicating with the agent on port {port}"),
            message,
            ErrorType::Agent,
        )
        .with_suggestions([
            "Check the server logs of `devmentor serve`",
            "Run `devmentor diagnose` for a full report",
        ])
    }

    pub fn missing_api_key(env_var: &str) -> EnhancedError {
        EnhancedError::new(
            "Missing API Key",
            format!("{env_var} is not set; persona replies will fail until it is."),
            ErrorType::Configuration,
        )
        .with_suggestions([
            format!("export {env_var}=sk-or-..."),
            format!("Add {env_var}=... to a .env file in the working directory"),
            "Or set llm.api_key in .devmentor/settings.local.json".to_string(),
        ])
    }

    pub fn unknown_persona(key: &str, known: &[&str]) -> EnhancedError {
        EnhancedError::new(
            "Unknown Persona",
            format!("'{key}' is not a registered persona."),
            ErrorType::Validation,
        )
        .with_suggestion(format!("Use one of: {}", known.join(", ")))
    }

    pub fn invalid_tool_arguments(tool: &str, detail: &str) -> EnhancedError {
        EnhancedError::new(
            "Invalid Tool Arguments",
            format!("Arguments for '{tool}' must be a JSON object: {detail}"),
            ErrorType::Validation,
        )
        .with_suggestion(r#"Example: devmentor tool search_docs --args '{"query":"big o notation"}'"#)
    }
}
