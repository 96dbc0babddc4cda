//! Read-only query operations over an [`Index`].
//!
//! Every operation is a pure function of the index and its parameters. Lookups that miss
//! return `None`; deciding how to report that is up to the caller.

use crate::index::{Endpoint, HttpMethod, Index, SchemaType};
use crate::resolver::{decode_fragment, visit_refs};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 500;

const SCHEMA_POINTER_PREFIX: &str = "/components/schemas/";

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEndpointsParams {
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for ListEndpointsParams {
    fn default() -> Self {
        Self {
            method: None,
            tag: None,
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// Which endpoint fields a search looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchIn {
    Path,
    Summary,
    Description,
    #[default]
    All,
}

impl SearchIn {
    fn covers(self, field: SearchField) -> bool {
        match self {
            SearchIn::All => true,
            SearchIn::Path => field == SearchField::Path,
            SearchIn::Summary => field == SearchField::Summary,
            SearchIn::Description => field == SearchField::Description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEndpointsParams {
    pub query: String,
    #[serde(default)]
    pub search_in: SearchIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointDetailsParams {
    pub path: String,
    pub method: HttpMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListSchemasParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for ListSchemasParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchemaDetailsParams {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInfoResult {
    pub openapi: String,
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub servers: Vec<String>,
    pub tags: Vec<String>,
    pub total_endpoints: usize,
    pub total_schemas: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSummary {
    pub path: String,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEndpointsResult {
    pub endpoints: Vec<EndpointSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    Path,
    Summary,
    Description,
}

impl SearchField {
    fn weight(self) -> u32 {
        match self {
            SearchField::Path => 3,
            SearchField::Summary => 2,
            SearchField::Description => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub path: String,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub relevance: u32,
    pub matched_fields: Vec<SearchField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchEndpointsResult {
    pub results: Vec<SearchHit>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDetails {
    pub path: String,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responses: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSummary {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListSchemasResult {
    pub schemas: Vec<SchemaSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDetails {
    pub name: String,
    pub schema: Value,
    /// Omitted when the entry is itself an unresolved reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

fn non_empty<T>(items: &[T]) -> Option<Vec<T>>
where
    T: Clone,
{
    (!items.is_empty()).then(|| items.to_vec())
}

#[derive(Debug, Clone)]
pub struct QueryEngine {
    index: Arc<Index>,
}

impl QueryEngine {
    #[must_use]
    pub fn new(index: Arc<Index>) -> Self {
        Self { index }
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn get_api_info(&self) -> ApiInfoResult {
        let info = self.index.info();
        ApiInfoResult {
            openapi: info.openapi.clone(),
            title: info.title.clone(),
            version: info.version.clone(),
            description: info.description.clone(),
            summary: info.summary.clone(),
            servers: info.servers.clone(),
            tags: info.tags.clone(),
            total_endpoints: self.index.endpoints().len(),
            total_schemas: self.index.schemas().len(),
        }
    }

    #[must_use]
    pub fn list_endpoints(&self, params: &ListEndpointsParams) -> ListEndpointsResult {
        let filtered: Vec<&Endpoint> = self
            .index
            .endpoints()
            .iter()
            .filter(|e| params.method.is_none_or(|m| e.method == m))
            .filter(|e| {
                params
                    .tag
                    .as_deref()
                    .is_none_or(|tag| e.tags.iter().flatten().any(|t| t == tag))
            })
            .collect();

        let endpoints = filtered
            .iter()
            .skip(params.offset)
            .take(params.limit)
            .map(|e| EndpointSummary {
                path: e.path.clone(),
                method: e.method,
                summary: e.summary.clone(),
                tags: e.tags.clone(),
                operation_id: e.operation_id.clone(),
                deprecated: e.deprecated,
            })
            .collect();

        ListEndpointsResult {
            endpoints,
            total: filtered.len(),
            limit: params.limit,
            offset: params.offset,
        }
    }

    /// Case-insensitive substring search, ranked by the summed weight of matched fields.
    #[must_use]
    pub fn search_endpoints(&self, params: &SearchEndpointsParams) -> SearchEndpointsResult {
        let needle = params.query.to_lowercase();
        let matches = |haystack: Option<&str>| {
            haystack.is_some_and(|h| h.to_lowercase().contains(&needle))
        };

        let mut results: Vec<SearchHit> = Vec::new();
        for e in self.index.endpoints() {
            let candidates = [
                (SearchField::Path, Some(e.path.as_str())),
                (SearchField::Summary, e.summary.as_deref()),
                (SearchField::Description, e.description.as_deref()),
            ];
            let matched_fields: Vec<SearchField> = candidates
                .into_iter()
                .filter(|(field, text)| params.search_in.covers(*field) && matches(*text))
                .map(|(field, _)| field)
                .collect();
            if matched_fields.is_empty() {
                continue;
            }

            results.push(SearchHit {
                path: e.path.clone(),
                method: e.method,
                summary: e.summary.clone(),
                description: e.description.clone(),
                relevance: matched_fields.iter().map(|f| f.weight()).sum(),
                matched_fields,
            });
        }

        // Stable: equal relevance keeps index order.
        results.sort_by(|a, b| b.relevance.cmp(&a.relevance));

        SearchEndpointsResult {
            total: results.len(),
            results,
        }
    }

    #[must_use]
    pub fn get_endpoint_details(&self, params: &EndpointDetailsParams) -> Option<EndpointDetails> {
        let e = self.index.endpoint(&params.path, params.method)?;
        Some(EndpointDetails {
            path: e.path.clone(),
            method: e.method,
            summary: e.summary.clone(),
            description: e.description.clone(),
            operation_id: e.operation_id.clone(),
            tags: e.tags.clone(),
            parameters: non_empty(&e.parameters),
            request_body: e.request_body.clone(),
            responses: e.responses.clone(),
            deprecated: e.deprecated,
            security: e.security.clone(),
        })
    }

    #[must_use]
    pub fn list_schemas(&self, params: &ListSchemasParams) -> ListSchemasResult {
        let all = self.index.schemas();
        let schemas = all
            .iter()
            .skip(params.offset)
            .take(params.limit)
            .map(|s| SchemaSummary {
                name: s.name.clone(),
                schema_type: s.schema_type(),
                description: s.description().map(str::to_string),
                deprecated: s.deprecated(),
            })
            .collect();

        ListSchemasResult {
            schemas,
            total: all.len(),
            limit: params.limit,
            offset: params.offset,
        }
    }

    #[must_use]
    pub fn get_schema_details(&self, params: &SchemaDetailsParams) -> Option<SchemaDetails> {
        let entry = self.index.schema(&params.name)?;
        let dependencies = if entry.is_unresolved_ref() {
            None
        } else {
            let mut found = Vec::new();
            self.collect_dependencies(&entry.declared, &entry.name, &mut found);
            Some(found)
        };

        Some(SchemaDetails {
            name: entry.name.clone(),
            schema: entry.schema.clone(),
            dependencies,
        })
    }

    /// Depth-first, pre-order walk over declared schemas; `found` keeps first-seen order.
    fn collect_dependencies(&self, declared: &Value, root_name: &str, found: &mut Vec<String>) {
        let mut direct: Vec<String> = Vec::new();
        visit_refs(declared, &mut |reference| {
            if let Some(name) = schema_ref_name(reference) {
                direct.push(name);
            }
        });

        for name in direct {
            if name == root_name || found.contains(&name) {
                continue;
            }
            found.push(name.clone());
            if let Some(dep) = self.index.schema(&name) {
                self.collect_dependencies(&dep.declared, root_name, found);
            }
        }
    }
}

/// `#/components/schemas/Pet` → `Pet`.
fn schema_ref_name(reference: &str) -> Option<String> {
    let pointer = decode_fragment(reference.strip_prefix('#')?)?;
    let rest = pointer.strip_prefix(SCHEMA_POINTER_PREFIX)?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some(rest.replace("~1", "/").replace("~0", "~"))
}
