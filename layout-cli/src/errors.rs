use std::path::PathBuf;

use layout_types::DecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("invalid customizations in {path:?}: {source}")]
    Customization {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("unknown template '{name}' (available: {available})")]
    UnknownTemplate { name: String, available: String },
    #[error("exactly one of 'template' or 'template_file' must be set")]
    TemplateSource,
    #[error("unsupported file format for {path:?}: expected .toml or .json")]
    UnsupportedFormat { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
