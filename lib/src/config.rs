use crate::error::Result;
use crate::format::Format;
use crate::tree::IdPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Converter configuration, passed explicitly to every conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Source format used when the caller gives none
    #[serde(default)]
    pub default_from: Option<Format>,

    /// Destination format used when the caller gives none
    #[serde(default)]
    pub default_to: Option<Format>,

    /// Handling of colliding node ids while importing
    #[serde(default)]
    pub id_policy: IdPolicy,

    /// Title of the synthetic root created for Chrome imports
    #[serde(default = "default_root_title")]
    pub root_title: String,

    /// Indent InternalJSON output
    #[serde(default = "default_pretty_json")]
    pub pretty_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_from: None,
            default_to: None,
            id_policy: IdPolicy::default(),
            root_title: default_root_title(),
            pretty_json: default_pretty_json(),
        }
    }
}

fn default_root_title() -> String {
    "roots".to_string()
}

fn default_pretty_json() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }
}
