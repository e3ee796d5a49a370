use std::path::Path;

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use tracing::debug;

use crate::error::TemplateError;
use crate::template::{COMMIT_TEMPLATE, DEFAULT_COMMIT_SOURCE, MessageTemplate};

/// File extensions recognized by [`TemplateManager::load_dir`].
const TEMPLATE_EXTENSIONS: [&str; 2] = ["j2", "jinja"];

/// Manages message templates and renders them with context variables.
///
/// A new manager always contains the built-in templates. Templates added
/// later with the same name replace the built-in version.
#[derive(Debug)]
pub struct TemplateManager {
    env: Environment<'static>,
}

impl TemplateManager {
    /// Create a manager preloaded with the built-in templates.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        let mut manager = Self { env };
        // The built-in source is a constant and always parses.
        let _ = manager.add_template(MessageTemplate::new(COMMIT_TEMPLATE, DEFAULT_COMMIT_SOURCE));
        manager
    }

    /// Load all `.j2` / `.jinja` templates from a directory.
    ///
    /// The template name is the file stem, so `commit.j2` overrides the
    /// built-in `commit` template. Returns the number of templates loaded.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Io` if the directory or a file cannot be read.
    /// Returns `TemplateError::InvalidTemplate` if a file fails to parse.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, TemplateError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_template = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext));
            if path.is_file() && is_template {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = std::fs::read_to_string(path)?;
            debug!(name, path = %path.display(), "loading template");
            self.add_template(MessageTemplate::new(name, source))?;
        }

        Ok(paths.len())
    }

    /// Register a single template, replacing any template with the same name.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::InvalidTemplate` if the source fails to parse.
    pub fn add_template(&mut self, template: MessageTemplate) -> Result<(), TemplateError> {
        let MessageTemplate { name, source } = template;
        self.env
            .add_template_owned(name.clone(), source)
            .map_err(|e| TemplateError::InvalidTemplate(format!("{name}: {e}")))
    }

    /// Returns whether a template with the given name is registered.
    pub fn has_template(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    /// Render a template by name with the given context.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::TemplateNotFound` for an unknown name.
    /// Returns `TemplateError::RenderError` if rendering fails, including
    /// references to variables missing from the context.
    pub fn render(&self, name: &str, ctx: &serde_json::Value) -> Result<String, TemplateError> {
        let template = self.env.get_template(name).map_err(|e| match e.kind() {
            ErrorKind::TemplateNotFound => TemplateError::TemplateNotFound(name.to_owned()),
            _ => TemplateError::RenderError(e.to_string()),
        })?;

        template
            .render(ctx)
            .map(|rendered| rendered.trim().to_owned())
            .map_err(|e| TemplateError::RenderError(e.to_string()))
    }
}

impl Default for TemplateManager {
    fn default() -> Self {
        Self::new()
    }
}
