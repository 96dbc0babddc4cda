use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use openapi_mcp_index::{HashPolicy, SourceConfig};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "openapi-mcp", version)]
#[command(about = "Serve an OpenAPI document as read-only MCP query tools over stdio")]
pub struct Cli {
    /// `OpenAPI` document: file path (.json, .yaml, .yml) or http(s) URL
    #[arg(env = "OPENAPI_MCP_SPEC")]
    pub spec: Option<String>,

    /// Config file (YAML or JSON); command-line values take precedence
    #[arg(long, env = "OPENAPI_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Expected document digest (`sha256:<hex>`)
    #[arg(long, env = "OPENAPI_MCP_SPEC_HASH")]
    pub spec_hash: Option<String>,

    /// What to do when the digest differs: warn, fail or ignore
    #[arg(long, env = "OPENAPI_MCP_SPEC_HASH_POLICY")]
    pub spec_hash_policy: Option<HashPolicy>,

    /// Timeout in seconds for fetching the document over HTTP
    #[arg(long, env = "OPENAPI_MCP_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: Option<u64>,

    /// Maximum size in bytes of a fetched document
    #[arg(long, env = "OPENAPI_MCP_MAX_DOCUMENT_BYTES")]
    pub max_document_bytes: Option<usize>,

    /// Node budget for inlining `$ref`s before serving the declared document as-is
    #[arg(long, env = "OPENAPI_MCP_MAX_RESOLVED_NODES")]
    pub max_resolved_nodes: Option<usize>,

    /// Log filter (e.g. `info`, `openapi_mcp_index=debug`); falls back to `RUST_LOG`
    #[arg(long, env = "OPENAPI_MCP_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log output format (logs always go to stderr)
    #[arg(long, env = "OPENAPI_MCP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Merge the optional config file with command-line overrides.
    pub fn source_config(&self) -> anyhow::Result<SourceConfig> {
        let mut config = match &self.config {
            Some(path) => SourceConfig::from_file(path)
                .with_context(|| format!("load config {}", path.display()))?,
            None => SourceConfig::default(),
        };

        if let Some(spec) = &self.spec {
            config.spec = Some(spec.clone());
        }
        if let Some(hash) = &self.spec_hash {
            config.spec_hash = Some(hash.clone());
        }
        if let Some(policy) = self.spec_hash_policy {
            config.spec_hash_policy = policy;
        }
        if let Some(secs) = self.fetch_timeout_secs {
            config.fetch_timeout_secs = secs;
        }
        if let Some(bytes) = self.max_document_bytes {
            config.max_document_bytes = Some(bytes);
        }
        if let Some(nodes) = self.max_resolved_nodes {
            config.max_resolved_nodes = nodes;
        }
        Ok(config)
    }
}
