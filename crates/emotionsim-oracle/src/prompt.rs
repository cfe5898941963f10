//! Prompt rendering via `minijinja`.
//!
//! Two templates produce the oracle call: `system.j2` (role preamble and
//! response-schema instruction) and `context.j2` (the ordered context
//! sections). Default templates are compiled in; operators can override
//! them from a directory without recompiling.

use minijinja::Environment;

use crate::error::OracleError;

/// Compiled-in default system template.
const DEFAULT_SYSTEM: &str = include_str!("../templates/system.j2");

/// Compiled-in default context template.
const DEFAULT_CONTEXT: &str = include_str!("../templates/context.j2");

/// The complete rendered prompt ready to send to a backend.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    /// System message establishing the agent's identity and schema.
    pub system: String,
    /// User message carrying the per-tick context.
    pub user: String,
}

/// Manages prompt template loading and rendering.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Create an engine with the compiled-in default templates.
    pub fn new() -> Result<Self, OracleError> {
        let mut env = Environment::new();
        env.add_template_owned("system", DEFAULT_SYSTEM.to_owned())
            .map_err(|e| OracleError::Template(format!("failed to add system template: {e}")))?;
        env.add_template_owned("context", DEFAULT_CONTEXT.to_owned())
            .map_err(|e| OracleError::Template(format!("failed to add context template: {e}")))?;
        Ok(Self { env })
    }

    /// Create an engine loading `system.j2` and `context.j2` from a
    /// directory, so prompts can be tuned without recompiling.
    pub fn from_dir(templates_dir: &str) -> Result<Self, OracleError> {
        let mut env = Environment::new();
        let system = load_template(templates_dir, "system.j2")?;
        let context = load_template(templates_dir, "context.j2")?;
        env.add_template_owned("system", system)
            .map_err(|e| OracleError::Template(format!("failed to add system template: {e}")))?;
        env.add_template_owned("context", context)
            .map_err(|e| OracleError::Template(format!("failed to add context template: {e}")))?;
        Ok(Self { env })
    }

    /// Render both templates against the assembled context object.
    pub fn render(&self, context: &serde_json::Value) -> Result<RenderedPrompt, OracleError> {
        let system = self
            .env
            .get_template("system")
            .map_err(|e| OracleError::Template(format!("missing system template: {e}")))?
            .render(context)
            .map_err(|e| OracleError::Template(format!("system render failed: {e}")))?;
        let user = self
            .env
            .get_template("context")
            .map_err(|e| OracleError::Template(format!("missing context template: {e}")))?
            .render(context)
            .map_err(|e| OracleError::Template(format!("context render failed: {e}")))?;
        Ok(RenderedPrompt { system, user })
    }
}

/// Read one template file from disk.
fn load_template(dir: &str, name: &str) -> Result<String, OracleError> {
    let path = std::path::Path::new(dir).join(name);
    std::fs::read_to_string(&path)
        .map_err(|e| OracleError::Template(format!("failed to read {}: {e}", path.display())))
}
