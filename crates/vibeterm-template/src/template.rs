//! Template source types used by the template manager.

use serde::{Deserialize, Serialize};

/// Name of the template used for auto-generated commit messages.
pub const COMMIT_TEMPLATE: &str = "commit";

/// Built-in source of the [`COMMIT_TEMPLATE`].
pub const DEFAULT_COMMIT_SOURCE: &str = "Auto-commit: {{ timestamp }}";

/// A named message template and its Jinja2 source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Template name used for lookup (e.g., `commit`).
    pub name: String,

    /// Raw Jinja2 template source.
    pub source: String,
}

impl MessageTemplate {
    /// Create a template from a name and source.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}
