use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::column_manager::ColumnDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub render: RenderConfig,
    pub images: ImageConfig,

    /// Replaces the built-in column catalog when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnDescriptor>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the status web application, without the `/api/v1` suffix
    pub base_url: String,

    /// Optional bearer token sent with every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Request timeout in seconds (0 leaves the client default)
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// External sample search tool linked from `scilife_name` cells
    pub sample_search_url: String,

    /// Prefix for `workset_name` / `workset_setup` links
    pub workset_url: String,

    /// Prefix for `reagent_label` links
    pub reagent_label_url: String,

    /// Tab rendered when none is given on the command line
    pub default_tab: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Resolve thumbnail placeholders after rendering
    pub enabled: bool,

    /// Maximum number of image fetches in flight
    pub max_concurrent: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            render: RenderConfig::default(),
            images: ImageConfig::default(),
            columns: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9761".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_search_url: "https://lims.example.org/clarity/search".to_string(),
            workset_url: "/workset/".to_string(),
            reagent_label_url: "/barcode/".to_string(),
            default_tab: "samples".to_string(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: 4,
        }
    }
}

impl Config {
    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            // Create default config if it doesn't exist
            let default_config = Self::default();
            default_config.save()?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.images.max_concurrent == 0 {
            config.images.max_concurrent = 1;
        }
        config.api.base_url = config.api.base_url.trim_end_matches('/').to_string();

        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(&config_path, contents)?;

        Ok(())
    }

    /// Get the default config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("status-tables").join("config.toml"))
    }

    /// Create a default config file with comments
    pub fn create_default_with_comments() -> String {
        r#"# status-tables configuration file
# Location: ~/.config/status-tables/config.toml (Linux)
#           ~/Library/Application Support/status-tables/config.toml (macOS)

[api]
# Base URL of the status web application (the /api/v1 prefix is added)
base_url = "http://localhost:9761"

# Bearer token, if the API sits behind authentication
# token = "..."

# Request timeout in seconds
timeout_secs = 30

[render]
# Sample search tool linked from the SciLife sample name column (absolute URL)
sample_search_url = "https://lims.example.org/clarity/search"

# Link prefixes for monospaced link columns
workset_url = "/workset/"
reagent_label_url = "/barcode/"

# "samples" or "library-validation"
default_tab = "samples"

[images]
# Fetch caliper / fragment analyzer thumbnails after rendering
enabled = true

# Maximum number of concurrent image requests
max_concurrent = 4

# Replace the built-in column catalog (order = checkbox order)
# [[columns]]
# display_name = "SciLife Sample Name"
# column_id = "scilife_name"
# group = "basic"
"#
        .to_string()
    }
}
