//! Build configuration.
//!
//! A build is described by a [`BuildConfig`]. Values come from up to three
//! layers, merged key-by-key as TOML tables before deserializing:
//!
//! ```text
//! stock defaults  →  --config file.toml  →  command-line flags
//!   (lowest)                                    (highest)
//! ```
//!
//! The command line is converted into a sparse TOML table containing only
//! the flags that were given, so a file can supply anything the command line
//! leaves out.
//!
//! ## Options
//!
//! ```toml
//! # Mandatory, from either layer
//! welcome = "index.html"       # Main page, relative to the source directory
//! favicon = "favicon.png"      # Relative to the source directory
//! language = "eng"
//! title = "My Site"
//! description = "Offline copy of my site"
//! creator = "Me"
//! publisher = "Me"
//!
//! # Optional, defaults shown
//! min_chunk_size = 2048        # Cluster size threshold in bytes
//! inflate_html = false         # Inflate gzip/zlib-compressed HTML
//! unique_namespace = false     # Put all content in namespace A
//! max_recurse = 10             # Template expansion depth
//! # redirects = "redirects.tsv"  # url<TAB>title<TAB>target per line
//! # layout = "_layout.html"      # Layout page, relative to the source directory
//! ```
//!
//! Unknown keys are rejected.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing mandatory option: {0}")]
    Missing(&'static str),
    #[error("welcome page not found: {}", .0.display())]
    WelcomeNotFound(PathBuf),
    #[error("favicon not found: {}", .0.display())]
    FaviconNotFound(PathBuf),
    #[error("layout page not found: {}", .0.display())]
    LayoutNotFound(PathBuf),
    #[error("redirects file not found: {}", .0.display())]
    RedirectsNotFound(PathBuf),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Everything a build needs besides the source and output paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub welcome: String,
    pub favicon: String,
    pub language: String,
    pub title: String,
    pub description: String,
    pub creator: String,
    pub publisher: String,
    /// Clusters are closed once they hold at least this many bytes.
    pub min_chunk_size: usize,
    pub inflate_html: bool,
    pub unique_namespace: bool,
    /// Budget for nested `content` and link expansions in templates.
    pub max_recurse: u32,
    pub redirects: Option<String>,
    pub layout: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            welcome: String::new(),
            favicon: String::new(),
            language: String::new(),
            title: String::new(),
            description: String::new(),
            creator: String::new(),
            publisher: String::new(),
            min_chunk_size: 2048,
            inflate_html: false,
            unique_namespace: false,
            max_recurse: 10,
            redirects: None,
            layout: None,
        }
    }
}

impl BuildConfig {
    /// Check mandatory options are present and values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mandatory = [
            ("welcome", &self.welcome),
            ("favicon", &self.favicon),
            ("language", &self.language),
            ("title", &self.title),
            ("description", &self.description),
            ("creator", &self.creator),
            ("publisher", &self.publisher),
        ];
        for (name, value) in mandatory {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        if self.min_chunk_size == 0 {
            return Err(ConfigError::Validation(
                "min_chunk_size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Check that the files the build reads up front exist. `root` is the
    /// source directory.
    pub fn check_inputs(&self, root: &Path) -> Result<(), ConfigError> {
        let welcome = root.join(&self.welcome);
        if !welcome.is_file() {
            return Err(ConfigError::WelcomeNotFound(welcome));
        }
        let favicon = root.join(&self.favicon);
        if !favicon.is_file() {
            return Err(ConfigError::FaviconNotFound(favicon));
        }
        if let Some(layout) = &self.layout {
            let layout = root.join(layout);
            if !layout.is_file() {
                return Err(ConfigError::LayoutNotFound(layout));
            }
        }
        if let Some(redirects) = &self.redirects {
            let redirects = PathBuf::from(redirects);
            if !redirects.is_file() {
                return Err(ConfigError::RedirectsNotFound(redirects));
            }
        }
        Ok(())
    }
}

/// The stock defaults as a `toml::Value::Table`, the bottom merge layer.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(BuildConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_config_file(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge `layers` (lowest priority first) over the stock defaults, then
/// deserialize and validate.
pub fn resolve_config(
    layers: impl IntoIterator<Item = toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let merged = layers
        .into_iter()
        .try_fold(stock_defaults_value()?, |base, layer| {
            Ok::<_, ConfigError>(merge_toml(base, layer))
        })?;
    let config: BuildConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}
