//! Build configuration files
//!
//! A build config names the base template, the image size, the requested
//! partitioning mode and the mountpoints the image asks for:
//!
//! ```toml
//! template = "plain"
//! image_size = "20 GiB"
//! partitioning_mode = "auto-lvm"
//! seed = 42
//! customizations = "disk.toml"
//!
//! [[filesystem]]
//! mountpoint = "/var"
//! minsize = "10 GiB"
//! ```
//!
//! TOML and JSON are both accepted, selected by file extension. Relative
//! paths inside the config are resolved against the config's directory.

use std::fs;
use std::path::{Path, PathBuf};

use layout_types::size::deserialize_size;
use layout_types::{
    DiskCustomization, FilesystemCustomization, PartitionTable, PartitioningMode,
    builtin_template, builtin_template_names,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ConfigError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Name of a built-in template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Path to a template document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_file: Option<PathBuf>,

    /// Requested image size in bytes
    #[serde(deserialize_with = "deserialize_size")]
    pub image_size: u64,

    #[serde(default)]
    pub partitioning_mode: PartitioningMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Path to a disk customization document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customizations: Option<PathBuf>,

    #[serde(default)]
    pub filesystem: Vec<FilesystemCustomization>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T> {
    let parsed = match Format::from_path(path)? {
        Format::Toml => toml::from_str(raw).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(raw).map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| ConfigError::Parse {
        path: path.to_path_buf(),
        reason,
    })
}

/// Load a build config from a `.toml` or `.json` file.
pub fn load(path: &Path) -> Result<BuildConfig> {
    let raw = read(path)?;
    let mut config: BuildConfig = parse(path, &raw)?;
    config.base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    debug!(
        path = %path.display(),
        mountpoints = config.filesystem.len(),
        "loaded build config"
    );
    Ok(config)
}

/// Load a partition table template document.
pub fn load_template(path: &Path) -> Result<PartitionTable> {
    let raw = read(path)?;
    parse(path, &raw)
}

/// Load a disk customization document, decoding strictly.
pub fn load_customizations(path: &Path) -> Result<DiskCustomization> {
    let raw = read(path)?;
    let decoded = match Format::from_path(path)? {
        Format::Toml => DiskCustomization::from_toml_str(&raw),
        Format::Json => DiskCustomization::from_json_str(&raw),
    };
    decoded.map_err(|source| ConfigError::Customization {
        path: path.to_path_buf(),
        source,
    })
}

impl BuildConfig {
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// The base partition table this config builds on
    pub fn base_table(&self) -> Result<PartitionTable> {
        match (&self.template, &self.template_file) {
            (Some(name), None) => {
                builtin_template(name).ok_or_else(|| ConfigError::UnknownTemplate {
                    name: name.clone(),
                    available: builtin_template_names().join(", "),
                })
            }
            (None, Some(path)) => load_template(&self.resolve_path(path)),
            _ => Err(ConfigError::TemplateSource),
        }
    }

    /// The disk customizations, from `override_path` if given, else from the
    /// config's own `customizations` entry.
    pub fn disk_customizations(
        &self,
        override_path: Option<&Path>,
    ) -> Result<Option<DiskCustomization>> {
        let path = match (override_path, &self.customizations) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(path)) => self.resolve_path(path),
            (None, None) => return Ok(None),
        };
        load_customizations(&path).map(Some)
    }
}
