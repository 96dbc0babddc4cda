//! Document indexer.
//!
//! One pass over the resolved tree produces the flat endpoint list and the schema table that
//! every query runs against. The [`Index`] is immutable once built.

use crate::error::IndexError;
use crate::resolver::{ResolutionOutcome, ResolvedDocument};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const DEFAULT_OPENAPI_VERSION: &str = "3.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
    Trace,
}

impl HttpMethod {
    /// Every method, in the order endpoints of one path are listed.
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Options,
        HttpMethod::Head,
        HttpMethod::Trace,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Key of this method inside a path item.
    fn path_item_key(self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
            HttpMethod::Patch => "patch",
            HttpMethod::Options => "options",
            HttpMethod::Head => "head",
            HttpMethod::Trace => "trace",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown HTTP method '{s}'"))
    }
}

/// Document-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiInfo {
    pub openapi: String,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub servers: Vec<String>,
    pub tags: Vec<String>,
}

/// One operation declared at one path.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub path: String,
    pub method: HttpMethod,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub operation_id: Option<String>,
    /// Declared tags, deduplicated; `None` when the operation declares none.
    pub tags: Option<Vec<String>>,
    /// As declared; `None` when absent.
    pub deprecated: Option<bool>,
    /// Path-level parameters merged with the operation's own.
    pub parameters: Vec<Value>,
    pub request_body: Option<Value>,
    pub responses: Option<Value>,
    pub security: Option<Value>,
}

/// `type` of a schema: a single name, or a 3.1 union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SchemaType {
    Single(String),
    Union(Vec<String>),
}

/// A named entry of `components.schemas`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaEntry {
    pub name: String,
    /// The schema with references inlined where possible.
    pub schema: Value,
    /// The schema as written, used for dependency discovery.
    pub declared: Value,
}

impl SchemaEntry {
    /// The entry is itself a reference that could not be inlined.
    #[must_use]
    pub fn is_unresolved_ref(&self) -> bool {
        self.schema
            .as_object()
            .is_some_and(|m| m.get("$ref").is_some_and(Value::is_string))
    }

    #[must_use]
    pub fn schema_type(&self) -> Option<SchemaType> {
        if self.is_unresolved_ref() {
            return Some(SchemaType::Single("reference".to_string()));
        }
        match self.schema.get("type")? {
            Value::String(s) => Some(SchemaType::Single(s.clone())),
            Value::Array(items) => {
                let names: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                (!names.is_empty()).then_some(SchemaType::Union(names))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        if self.is_unresolved_ref() {
            return None;
        }
        self.schema.get("description").and_then(Value::as_str)
    }

    #[must_use]
    pub fn deprecated(&self) -> Option<bool> {
        if self.is_unresolved_ref() {
            return None;
        }
        self.schema.get("deprecated").and_then(Value::as_bool)
    }
}

#[derive(Debug, Clone)]
pub struct Index {
    info: ApiInfo,
    endpoints: Vec<Endpoint>,
    schemas: Vec<SchemaEntry>,
    endpoint_lookup: HashMap<(String, HttpMethod), usize>,
    schema_lookup: HashMap<String, usize>,
    outcome: ResolutionOutcome,
}

impl Index {
    /// Build the index from a resolved document.
    ///
    /// # Errors
    ///
    /// Returns an [`IndexError`] if `info.title` or `info.version` is missing.
    pub fn build(resolved: ResolvedDocument) -> Result<Self, IndexError> {
        let ResolvedDocument {
            root,
            declared,
            outcome,
            ..
        } = resolved;

        let info = extract_info(&root)?;
        let endpoints = extract_endpoints(&root);
        let schemas = extract_schemas(&root, &declared);

        let mut endpoint_lookup = HashMap::with_capacity(endpoints.len());
        for (i, e) in endpoints.iter().enumerate() {
            endpoint_lookup.insert((e.path.clone(), e.method), i);
        }
        let mut schema_lookup = HashMap::with_capacity(schemas.len());
        for (i, s) in schemas.iter().enumerate() {
            schema_lookup.insert(s.name.clone(), i);
        }

        Ok(Self {
            info,
            endpoints,
            schemas,
            endpoint_lookup,
            schema_lookup,
            outcome,
        })
    }

    #[must_use]
    pub fn info(&self) -> &ApiInfo {
        &self.info
    }

    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    #[must_use]
    pub fn schemas(&self) -> &[SchemaEntry] {
        &self.schemas
    }

    #[must_use]
    pub fn endpoint(&self, path: &str, method: HttpMethod) -> Option<&Endpoint> {
        self.endpoint_lookup
            .get(&(path.to_string(), method))
            .map(|&i| &self.endpoints[i])
    }

    #[must_use]
    pub fn schema(&self, name: &str) -> Option<&SchemaEntry> {
        self.schema_lookup.get(name).map(|&i| &self.schemas[i])
    }

    /// How completely references were inlined before indexing.
    #[must_use]
    pub fn outcome(&self) -> &ResolutionOutcome {
        &self.outcome
    }
}

fn string_field(node: &Value, key: &str) -> Option<String> {
    node.get(key).and_then(Value::as_str).map(str::to_string)
}

fn extract_info(root: &Value) -> Result<ApiInfo, IndexError> {
    let info = root.get("info").unwrap_or(&Value::Null);

    let title = string_field(info, "title").ok_or(IndexError::MissingTitle)?;
    let version = match info.get("version") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(IndexError::MissingVersion),
    };
    let openapi = match root.get("openapi") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => DEFAULT_OPENAPI_VERSION.to_string(),
    };

    let servers = root
        .get("servers")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|s| string_field(s, "url")).collect())
        .unwrap_or_default();
    let tags = root
        .get("tags")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|t| string_field(t, "name")).collect())
        .unwrap_or_default();

    Ok(ApiInfo {
        openapi,
        title,
        version,
        description: string_field(info, "description"),
        summary: string_field(info, "summary"),
        servers,
        tags,
    })
}

fn extract_endpoints(root: &Value) -> Vec<Endpoint> {
    let Some(paths) = root.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut endpoints = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            tracing::debug!("Skipping path '{path}': path item is not an object");
            continue;
        };
        if item.contains_key("$ref") {
            tracing::debug!("Skipping path '{path}': unresolved path item reference");
            continue;
        }

        let shared_params = item.get("parameters").and_then(Value::as_array);
        for method in HttpMethod::ALL {
            let Some(op) = item.get(method.path_item_key()).and_then(Value::as_object) else {
                continue;
            };
            endpoints.push(build_endpoint(path, method, op, shared_params));
        }
    }
    endpoints
}

fn build_endpoint(
    path: &str,
    method: HttpMethod,
    op: &Map<String, Value>,
    shared_params: Option<&Vec<Value>>,
) -> Endpoint {
    let op_value = |key: &str| op.get(key).filter(|v| !v.is_null()).cloned();
    let op_string = |key: &str| op.get(key).and_then(Value::as_str).map(str::to_string);

    let tags = op.get("tags").and_then(Value::as_array).map(|declared| {
        let mut tags: Vec<String> = Vec::new();
        for tag in declared.iter().filter_map(Value::as_str) {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        tags
    });

    Endpoint {
        path: path.to_string(),
        method,
        summary: op_string("summary"),
        description: op_string("description"),
        operation_id: op_string("operationId"),
        tags,
        deprecated: op.get("deprecated").and_then(Value::as_bool),
        parameters: merge_parameters(shared_params, op.get("parameters").and_then(Value::as_array)),
        request_body: op_value("requestBody"),
        responses: op_value("responses"),
        security: op_value("security"),
    }
}

fn parameter_key(param: &Value) -> Option<(&str, &str)> {
    Some((
        param.get("name")?.as_str()?,
        param.get("in")?.as_str()?,
    ))
}

/// Path-level parameters followed by operation-level ones; an operation parameter with the same
/// `(name, in)` replaces the path-level entry in place.
fn merge_parameters(shared: Option<&Vec<Value>>, own: Option<&Vec<Value>>) -> Vec<Value> {
    let mut merged: Vec<Value> = shared.cloned().unwrap_or_default();
    for param in own.into_iter().flatten() {
        let existing = parameter_key(param).and_then(|key| {
            merged
                .iter()
                .position(|p| parameter_key(p) == Some(key))
        });
        match existing {
            Some(i) => merged[i] = param.clone(),
            None => merged.push(param.clone()),
        }
    }
    merged
}

fn extract_schemas(root: &Value, declared: &Value) -> Vec<SchemaEntry> {
    let Some(schemas) = root.pointer("/components/schemas").and_then(Value::as_object) else {
        return Vec::new();
    };
    let declared_schemas = declared
        .pointer("/components/schemas")
        .and_then(Value::as_object);

    schemas
        .iter()
        .map(|(name, schema)| SchemaEntry {
            name: name.clone(),
            schema: schema.clone(),
            declared: declared_schemas
                .and_then(|d| d.get(name))
                .cloned()
                .unwrap_or_else(|| schema.clone()),
        })
        .collect()
}
