use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::contract::Strategy;

pub const DEFAULT_BASE_URL: &str = "https://api.mixedbread.com";

/// Upload concurrency used when neither the command line nor the config sets one.
pub const DEFAULT_PARALLEL: usize = 100;

/// Explicit configuration handed to commands; nothing reads global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub defaults: UploadDefaults,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            defaults: UploadDefaults::default(),
        }
    }
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            base_url = %self.base_url,
            api_key_set = self.api_key.is_some(),
            strategy = ?self.defaults.strategy,
            contextualization = ?self.defaults.contextualization,
            parallel = ?self.defaults.parallel,
            "Loaded Config"
        );
        debug!(defaults = ?self.defaults, "Config defaults (full debug)");
    }
}

/// The "defaults" tier of upload settings: config-level, or a manifest's own
/// `defaults` section layered on top of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadDefaults {
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub contextualization: Option<bool>,
    #[serde(default)]
    pub parallel: Option<usize>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl UploadDefaults {
    /// Returns `self` with unset fields filled from `base`. Metadata keys from
    /// `self` override those of `base`.
    pub fn layered_over(&self, base: &UploadDefaults) -> UploadDefaults {
        let mut metadata = base.metadata.clone();
        for (key, value) in &self.metadata {
            metadata.insert(key.clone(), value.clone());
        }
        UploadDefaults {
            strategy: self.strategy.or(base.strategy),
            contextualization: self.contextualization.or(base.contextualization),
            parallel: self.parallel.or(base.parallel),
            metadata,
        }
    }
}
