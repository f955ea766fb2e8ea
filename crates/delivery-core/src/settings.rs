//! Engine settings: where scripts live, what the target looks like, and how
//! strictly recorded hashes are enforced.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, Result};
use crate::tokens::ParameterSet;

/// Built-in token: path of the delivery directory.
pub const PARAM_DELIVERY_FOLDER: &str = "DeliveryFolder";
/// Built-in token: target site root path.
pub const PARAM_SITE_ROOT: &str = "SiteRoot";
/// Built-in token: target runtime install path.
pub const PARAM_INSTALL_PATH: &str = "InstallPath";
/// Built-in token: target runtime version.
pub const PARAM_RUNTIME_VERSION: &str = "RuntimeVersion";

/// What to do when a signed-for script's content no longer matches the
/// hash recorded when it was signed for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Skip silently (debug log only).
    Ignore,
    /// Skip, but tell the operator.
    #[default]
    Warn,
    /// Refuse to continue the run.
    Reject,
}

impl FromStr for HashPolicy {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(HashPolicy::Ignore),
            "warn" => Ok(HashPolicy::Warn),
            "reject" => Ok(HashPolicy::Reject),
            other => Err(DeliveryError::Settings {
                key: "DELIVERY_HASH_POLICY".to_string(),
                reason: format!("expected ignore|warn|reject, got '{other}'"),
            }),
        }
    }
}

/// Settings for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverySettings {
    /// Directory holding the delivery scripts
    pub delivery_dir: PathBuf,
    /// Target site root, if known
    pub site_root: Option<PathBuf>,
    /// Target runtime install path, if known
    pub install_path: Option<PathBuf>,
    /// Target runtime version string
    pub runtime_version: String,
    /// Enforcement of recorded content hashes
    pub hash_policy: HashPolicy,
}

impl DeliverySettings {
    pub fn new(delivery_dir: impl Into<PathBuf>) -> Self {
        Self {
            delivery_dir: delivery_dir.into(),
            site_root: None,
            install_path: None,
            runtime_version: "unknown".to_string(),
            hash_policy: HashPolicy::default(),
        }
    }

    pub fn with_site_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.site_root = Some(path.into());
        self
    }

    pub fn with_install_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_path = Some(path.into());
        self
    }

    pub fn with_runtime_version(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = version.into();
        self
    }

    pub fn with_hash_policy(mut self, policy: HashPolicy) -> Self {
        self.hash_policy = policy;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - DELIVERY_DIR (optional, default: "deliveries")
    /// - DELIVERY_SITE_ROOT (optional)
    /// - DELIVERY_INSTALL_PATH (optional)
    /// - DELIVERY_RUNTIME_VERSION (optional, default: "unknown")
    /// - DELIVERY_HASH_POLICY (optional, ignore|warn|reject, default: "warn")
    pub fn from_env() -> Result<Self> {
        let dir = std::env::var("DELIVERY_DIR").unwrap_or_else(|_| "deliveries".to_string());
        let mut settings = Self::new(dir);

        if let Ok(root) = std::env::var("DELIVERY_SITE_ROOT") {
            settings.site_root = Some(PathBuf::from(root));
        }
        if let Ok(path) = std::env::var("DELIVERY_INSTALL_PATH") {
            settings.install_path = Some(PathBuf::from(path));
        }
        if let Ok(version) = std::env::var("DELIVERY_RUNTIME_VERSION") {
            settings.runtime_version = version;
        }
        if let Ok(policy) = std::env::var("DELIVERY_HASH_POLICY") {
            settings.hash_policy = policy.parse()?;
        }

        Ok(settings)
    }

    /// Parameters every script can use without `-p:`.
    pub fn builtin_parameters(&self) -> ParameterSet {
        let mut params = ParameterSet::new();
        params.insert(PARAM_DELIVERY_FOLDER, path_string(&self.delivery_dir));
        if let Some(root) = &self.site_root {
            params.insert(PARAM_SITE_ROOT, path_string(root));
        }
        if let Some(path) = &self.install_path {
            params.insert(PARAM_INSTALL_PATH, path_string(path));
        }
        params.insert(PARAM_RUNTIME_VERSION, self.runtime_version.clone());
        params
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
