//! Startup pipeline: load → verify digest → resolve → index.
//!
//! Runs once before serving. Any failure aborts startup; no partial index is ever exposed.

use crate::config::{HashPolicy, SourceConfig};
use crate::error::{OpenApiIndexError, Result};
use crate::index::Index;
use crate::loader::DocumentLoader;
use crate::resolver::{ResolutionOutcome, resolve};

/// Build the index for the configured document.
///
/// # Errors
///
/// Returns an error if the config is invalid, the document cannot be loaded or parsed, the
/// digest check fails under [`HashPolicy::Fail`], or the document lacks `info.title` /
/// `info.version`.
pub async fn load_index(config: &SourceConfig) -> Result<Index> {
    config.validate()?;
    let source = config.spec()?;

    let loader = DocumentLoader::new(config.loader_options());
    let doc = loader.load(source).await?;
    tracing::info!(
        source = %doc.location,
        format = doc.format.as_str(),
        digest = %doc.digest,
        "Loaded OpenAPI document"
    );

    verify_digest(config, &doc.location, &doc.digest)?;

    let resolved = resolve(doc.tree, &config.resolver_options())?;
    if let ResolutionOutcome::Degraded { reason } = &resolved.outcome {
        tracing::warn!("Serving '{}' without inlined references: {reason}", doc.location);
    }
    if resolved.stats.unresolved > 0 {
        tracing::warn!(
            "{} reference(s) in '{}' could not be resolved and are kept as $ref",
            resolved.stats.unresolved,
            doc.location
        );
    }

    let index = Index::build(resolved)?;
    tracing::info!(
        title = %index.info().title,
        version = %index.info().version,
        endpoints = index.endpoints().len(),
        schemas = index.schemas().len(),
        "Indexed OpenAPI document"
    );
    Ok(index)
}

fn verify_digest(config: &SourceConfig, location: &str, actual: &str) -> Result<()> {
    let Some(expected) = &config.spec_hash else {
        return Ok(());
    };
    if expected == actual {
        return Ok(());
    }

    match config.spec_hash_policy {
        HashPolicy::Fail => Err(OpenApiIndexError::SpecHashMismatch {
            expected: expected.clone(),
            actual: actual.to_string(),
        }),
        HashPolicy::Warn => {
            tracing::warn!(
                "Spec hash mismatch for '{location}'. Expected: {expected}, Got: {actual}"
            );
            Ok(())
        }
        HashPolicy::Ignore => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IndexError, LoadError};
    use crate::loader::digest_bytes;
    use openapi_mcp_test_support::{fixture_path, read_fixture};
    use tempfile::tempdir;

    fn petstore_config() -> SourceConfig {
        SourceConfig::for_spec(fixture_path("petstore.json").to_string_lossy())
    }

    #[tokio::test]
    async fn test_loads_bundled_fixtures() {
        let index = load_index(&petstore_config()).await.unwrap();
        assert_eq!(index.endpoints().len(), 20);
        assert_eq!(index.schemas().len(), 6);
        assert_eq!(index.outcome(), &ResolutionOutcome::Complete);

        let cfg = SourceConfig::for_spec(fixture_path("openapi-3.1.yaml").to_string_lossy());
        let index = load_index(&cfg).await.unwrap();
        assert_eq!(index.info().title, "Task Tracker");
    }

    #[tokio::test]
    async fn test_digest_policies() {
        let actual = digest_bytes(read_fixture("petstore.json").unwrap().as_bytes());

        let mut cfg = petstore_config();
        cfg.spec_hash = Some(actual);
        cfg.spec_hash_policy = HashPolicy::Fail;
        assert!(load_index(&cfg).await.is_ok());

        cfg.spec_hash = Some("sha256:0000".to_string());
        let err = load_index(&cfg).await.unwrap_err();
        assert!(matches!(err, OpenApiIndexError::SpecHashMismatch { .. }));

        cfg.spec_hash_policy = HashPolicy::Warn;
        assert!(load_index(&cfg).await.is_ok());

        cfg.spec_hash_policy = HashPolicy::Ignore;
        assert!(load_index(&cfg).await.is_ok());
    }

    #[tokio::test]
    async fn test_failures_surface_by_stage() {
        let dir = tempdir().unwrap();

        let missing = dir.path().join("missing.yaml");
        let err = load_index(&SourceConfig::for_spec(missing.to_string_lossy()))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiIndexError::Load(LoadError::FileNotFound { .. })));

        let untitled = dir.path().join("untitled.yaml");
        std::fs::write(&untitled, "openapi: 3.0.0\ninfo:\n  version: '1'\npaths: {}\n").unwrap();
        let err = load_index(&SourceConfig::for_spec(untitled.to_string_lossy()))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiIndexError::Index(IndexError::MissingTitle)));

        let bad_ref = dir.path().join("bad-ref.json");
        std::fs::write(
            &bad_ref,
            r#"{"info": {"title": "t", "version": "1"}, "components": {"schemas": {"A": {"$ref": ""}}}}"#,
        )
        .unwrap();
        let err = load_index(&SourceConfig::for_spec(bad_ref.to_string_lossy()))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiIndexError::Parse(_)));

        let err = load_index(&SourceConfig::default()).await.unwrap_err();
        assert!(matches!(err, OpenApiIndexError::Config(_)));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_still_yields_index() {
        let mut cfg = petstore_config();
        cfg.max_resolved_nodes = 50;

        let index = load_index(&cfg).await.unwrap();
        assert!(index.outcome().is_degraded());
        assert_eq!(index.endpoints().len(), 20);
        let pet = index.schema("Pet").unwrap();
        assert_eq!(
            pet.schema["properties"]["category"]["$ref"],
            serde_json::json!("#/components/schemas/Category")
        );
    }
}
