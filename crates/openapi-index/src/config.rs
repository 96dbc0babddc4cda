use crate::error::{OpenApiIndexError, Result};
use crate::loader::LoaderOptions;
use crate::resolver::ResolverOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_RESOLVED_NODES: usize = 2_000_000;

/// Configuration for the document served by one process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// `OpenAPI` document location (URL or file path).
    #[serde(default)]
    pub spec: Option<String>,

    /// Optional document digest (`sha256:<hex>`) for version detection.
    #[serde(default)]
    pub spec_hash: Option<String>,

    /// Hash policy: warn, fail, or ignore.
    #[serde(default)]
    pub spec_hash_policy: HashPolicy,

    /// Timeout for fetching the document over HTTP.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Maximum size of a fetched document body. `None` = unlimited.
    #[serde(default)]
    pub max_document_bytes: Option<usize>,

    /// Budget of nodes produced while inlining `$ref`s before falling back to the declared
    /// document.
    #[serde(default = "default_max_resolved_nodes")]
    pub max_resolved_nodes: usize,
}

/// Hash verification policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Log warning if hash doesn't match.
    #[default]
    Warn,
    /// Fail startup if hash doesn't match.
    Fail,
    /// Ignore hash verification.
    Ignore,
}

impl std::str::FromStr for HashPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warn" => Ok(HashPolicy::Warn),
            "fail" => Ok(HashPolicy::Fail),
            "ignore" => Ok(HashPolicy::Ignore),
            other => Err(format!(
                "invalid hash policy '{other}' (expected warn, fail or ignore)"
            )),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_max_resolved_nodes() -> usize {
    DEFAULT_MAX_RESOLVED_NODES
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            spec: None,
            spec_hash: None,
            spec_hash_policy: HashPolicy::default(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_document_bytes: None,
            max_resolved_nodes: DEFAULT_MAX_RESOLVED_NODES,
        }
    }
}

impl SourceConfig {
    /// Config for a single document location with every other setting at its default.
    #[must_use]
    pub fn for_spec(spec: impl Into<String>) -> Self {
        Self {
            spec: Some(spec.into()),
            ..Self::default()
        }
    }

    /// Read a config file (YAML or JSON; JSON is a valid subset of YAML).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not match the config shape.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OpenApiIndexError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            OpenApiIndexError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// The configured document location.
    ///
    /// # Errors
    ///
    /// Returns an error if no location was configured.
    pub fn spec(&self) -> Result<&str> {
        self.spec
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                OpenApiIndexError::Config(
                    "no OpenAPI source configured (pass a path or URL)".to_string(),
                )
            })
    }

    /// Check the config for missing or contradictory settings.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.spec()?;

        if let Some(hash) = &self.spec_hash
            && !hash.starts_with("sha256:")
        {
            return Err(OpenApiIndexError::Config(format!(
                "specHash must have the form 'sha256:<hex>', got '{hash}'"
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(OpenApiIndexError::Config(
                "fetchTimeoutSecs must be greater than 0".to_string(),
            ));
        }
        if self.max_resolved_nodes == 0 {
            return Err(OpenApiIndexError::Config(
                "maxResolvedNodes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_response_bytes: self.max_document_bytes,
        }
    }

    #[must_use]
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            max_resolved_nodes: self.max_resolved_nodes,
        }
    }
}
