use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to spawn shell: {0}")]
    Spawn(String),

    #[error("invalid working directory: {}", .0.display())]
    InvalidWorkingDirectory(PathBuf),

    #[error("pty error: {0}")]
    Pty(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("template error: {0}")]
    Template(#[from] vibeterm_template::TemplateError),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
