mod error;
mod manager;
mod template;

pub use error::TemplateError;
pub use manager::TemplateManager;
pub use template::{COMMIT_TEMPLATE, DEFAULT_COMMIT_SOURCE, MessageTemplate};
