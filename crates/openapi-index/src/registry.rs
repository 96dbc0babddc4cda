//! Operation registry: the named, schema-described surface over [`QueryEngine`].
//!
//! Callers see operations only through [`OperationRegistry::list`] and
//! [`OperationRegistry::invoke`]. Arguments are checked against each operation's input schema
//! before being decoded into typed parameters.

use crate::error::{OpenApiIndexError, Result};
use crate::index::HttpMethod;
use crate::query::{
    DEFAULT_PAGE_LIMIT, EndpointDetailsParams, ListEndpointsParams, ListSchemasParams,
    MAX_PAGE_LIMIT, QueryEngine, SchemaDetailsParams, SearchEndpointsParams,
};
use jsonschema::error::ValidationErrorKind;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    GetApiInfo,
    ListEndpoints,
    SearchEndpoints,
    GetEndpointDetails,
    ListSchemas,
    GetSchemaDetails,
}

impl OperationKind {
    /// Registration order.
    pub const ALL: [OperationKind; 6] = [
        OperationKind::GetApiInfo,
        OperationKind::ListEndpoints,
        OperationKind::SearchEndpoints,
        OperationKind::GetEndpointDetails,
        OperationKind::ListSchemas,
        OperationKind::GetSchemaDetails,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::GetApiInfo => "get_api_info",
            OperationKind::ListEndpoints => "list_endpoints",
            OperationKind::SearchEndpoints => "search_endpoints",
            OperationKind::GetEndpointDetails => "get_endpoint_details",
            OperationKind::ListSchemas => "list_schemas",
            OperationKind::GetSchemaDetails => "get_schema_details",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            OperationKind::GetApiInfo => {
                "Get basic information about the OpenAPI document, including title, version, servers, tags, and counts of endpoints and schemas."
            }
            OperationKind::ListEndpoints => {
                "List all API endpoints with optional filtering by HTTP method or tag, and pagination support."
            }
            OperationKind::SearchEndpoints => {
                "Search API endpoints by keyword in path, summary, or description. Returns matching endpoints with relevance scores."
            }
            OperationKind::GetEndpointDetails => {
                "Get complete details of a specific API endpoint including parameters, request body, responses, and security requirements."
            }
            OperationKind::ListSchemas => {
                "List all data schemas (models) defined in the OpenAPI document with pagination support."
            }
            OperationKind::GetSchemaDetails => {
                "Get the complete structure and properties of a specific data schema (model) including the names of schemas it depends on."
            }
        }
    }

    /// JSON Schema describing the accepted arguments.
    #[must_use]
    pub fn input_schema(self) -> Value {
        let methods: Vec<&str> = HttpMethod::ALL.iter().map(|m| m.as_str()).collect();
        let pagination = |noun: &str| {
            json!({
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_PAGE_LIMIT,
                    "default": DEFAULT_PAGE_LIMIT,
                    "description": format!("Maximum number of {noun} to return (default: {DEFAULT_PAGE_LIMIT})"),
                },
                "offset": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 0,
                    "description": format!("Number of {noun} to skip for pagination (default: 0)"),
                },
            })
        };

        let mut schema = match self {
            OperationKind::GetApiInfo => json!({
                "type": "object",
                "properties": {},
            }),
            OperationKind::ListEndpoints => {
                let mut properties = json!({
                    "method": {
                        "type": "string",
                        "enum": methods,
                        "description": "Filter by HTTP method",
                    },
                    "tag": {
                        "type": "string",
                        "description": "Filter by tag",
                    },
                });
                if let (Some(props), Value::Object(page)) =
                    (properties.as_object_mut(), pagination("endpoints"))
                {
                    props.extend(page);
                }
                json!({
                    "type": "object",
                    "properties": properties,
                })
            }
            OperationKind::SearchEndpoints => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Search keyword or phrase",
                    },
                    "searchIn": {
                        "type": "string",
                        "enum": ["path", "summary", "description", "all"],
                        "default": "all",
                        "description": "Scope of search: path, summary, description, or all fields (default: all)",
                    },
                },
                "required": ["query"],
            }),
            OperationKind::GetEndpointDetails => json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "minLength": 1,
                        "description": "API path (e.g., \"/pets/{petId}\")",
                    },
                    "method": {
                        "type": "string",
                        "enum": methods,
                        "description": "HTTP method",
                    },
                },
                "required": ["path", "method"],
            }),
            OperationKind::ListSchemas => json!({
                "type": "object",
                "properties": pagination("schemas"),
            }),
            OperationKind::GetSchemaDetails => json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Schema name (e.g., \"Pet\", \"User\")",
                    },
                },
                "required": ["name"],
            }),
        };
        // Unknown parameters are rejected.
        if let Some(obj) = schema.as_object_mut() {
            obj.insert("additionalProperties".to_string(), Value::Bool(false));
        }
        schema
    }
}

/// A decoded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GetApiInfo,
    ListEndpoints(ListEndpointsParams),
    SearchEndpoints(SearchEndpointsParams),
    GetEndpointDetails(EndpointDetailsParams),
    ListSchemas(ListSchemasParams),
    GetSchemaDetails(SchemaDetailsParams),
}

impl Operation {
    /// Decode already-validated arguments into typed parameters.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiIndexError::InvalidArguments`] if the arguments do not fit the
    /// parameter type.
    pub fn decode(kind: OperationKind, args: Value) -> Result<Self> {
        Ok(match kind {
            OperationKind::GetApiInfo => Operation::GetApiInfo,
            OperationKind::ListEndpoints => Operation::ListEndpoints(decode_params(args)?),
            OperationKind::SearchEndpoints => Operation::SearchEndpoints(decode_params(args)?),
            OperationKind::GetEndpointDetails => {
                Operation::GetEndpointDetails(decode_params(args)?)
            }
            OperationKind::ListSchemas => Operation::ListSchemas(decode_params(args)?),
            OperationKind::GetSchemaDetails => Operation::GetSchemaDetails(decode_params(args)?),
        })
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::GetApiInfo => OperationKind::GetApiInfo,
            Operation::ListEndpoints(_) => OperationKind::ListEndpoints,
            Operation::SearchEndpoints(_) => OperationKind::SearchEndpoints,
            Operation::GetEndpointDetails(_) => OperationKind::GetEndpointDetails,
            Operation::ListSchemas(_) => OperationKind::ListSchemas,
            Operation::GetSchemaDetails(_) => OperationKind::GetSchemaDetails,
        }
    }
}

fn decode_params<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| {
        rejected(
            format!("Invalid params: {e}"),
            &[Violation::DecodeError {
                message: e.to_string(),
            }],
        )
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone)]
pub struct OperationRegistry {
    engine: QueryEngine,
}

impl OperationRegistry {
    #[must_use]
    pub fn new(engine: QueryEngine) -> Self {
        Self { engine }
    }

    #[must_use]
    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Every operation, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<OperationDescriptor> {
        OperationKind::ALL
            .into_iter()
            .map(|k| OperationDescriptor {
                name: k.name().to_string(),
                description: k.description().to_string(),
                input_schema: k.input_schema(),
            })
            .collect()
    }

    /// Validate `args`, run the named operation and return its JSON result.
    ///
    /// `args` may be `null`, which is treated as `{}`.
    ///
    /// # Errors
    ///
    /// - [`OpenApiIndexError::OperationNotFound`] for an unregistered name;
    /// - [`OpenApiIndexError::InvalidArguments`] when `args` violate the input schema;
    /// - [`OpenApiIndexError::ToolExecution`] when a lookup misses or the result cannot be
    ///   serialized.
    pub fn invoke(&self, name: &str, args: Value) -> Result<Value> {
        let kind = OperationKind::from_name(name)
            .ok_or_else(|| OpenApiIndexError::OperationNotFound(name.to_string()))?;
        let args = if args.is_null() { json!({}) } else { args };

        tracing::debug!(operation = name, "Invoking operation");
        validate_arguments(&kind.input_schema(), &args)?;

        self.execute(Operation::decode(kind, args)?)
    }

    /// Run a decoded operation.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiIndexError::ToolExecution`] when a lookup misses or the result cannot
    /// be serialized.
    pub fn execute(&self, operation: Operation) -> Result<Value> {
        match operation {
            Operation::GetApiInfo => to_json(&self.engine.get_api_info()),
            Operation::ListEndpoints(p) => to_json(&self.engine.list_endpoints(&p)),
            Operation::SearchEndpoints(p) => to_json(&self.engine.search_endpoints(&p)),
            Operation::GetEndpointDetails(p) => match self.engine.get_endpoint_details(&p) {
                Some(details) => to_json(&details),
                None => Err(OpenApiIndexError::ToolExecution(format!(
                    "Endpoint not found: {} {}",
                    p.method, p.path
                ))),
            },
            Operation::ListSchemas(p) => to_json(&self.engine.list_schemas(&p)),
            Operation::GetSchemaDetails(p) => match self.engine.get_schema_details(&p) {
                Some(details) => to_json(&details),
                None => Err(OpenApiIndexError::ToolExecution(format!(
                    "Schema not found: {}",
                    p.name
                ))),
            },
        }
    }
}

fn to_json<T: Serialize>(result: &T) -> Result<Value> {
    serde_json::to_value(result)
        .map_err(|e| OpenApiIndexError::ToolExecution(format!("failed to serialize result: {e}")))
}

/// One reason an argument object was rejected; serialized into the error's `data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum Violation {
    #[serde(rename_all = "camelCase")]
    InvalidParameter {
        parameter: String,
        suggestions: Vec<String>,
        valid_parameters: Vec<String>,
    },
    MissingRequiredParameter {
        parameter: String,
    },
    #[serde(rename_all = "camelCase")]
    ConstraintViolation {
        message: String,
        instance_path: String,
    },
    DecodeError {
        message: String,
    },
}

fn rejected(message: String, violations: &[Violation]) -> OpenApiIndexError {
    OpenApiIndexError::InvalidArguments {
        message,
        data: json!({
            "type": "validation-errors",
            "violations": violations,
        }),
    }
}

/// Check `args` against an operation's input shape.
///
/// Unknown and missing parameters are reported by name (with "did you mean" suggestions);
/// everything else comes from the JSON Schema validator.
fn validate_arguments(schema: &Value, args: &Value) -> Result<()> {
    let known: Vec<&str> = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().map(String::as_str).collect())
        .unwrap_or_default();
    let given = args.as_object();

    let mut violations: Vec<Violation> = Vec::new();
    for name in given.into_iter().flat_map(|obj| obj.keys()) {
        if !known.contains(&name.as_str()) {
            violations.push(Violation::InvalidParameter {
                parameter: name.clone(),
                suggestions: similar_names(name, &known),
                valid_parameters: known.iter().map(|k| (*k).to_string()).collect(),
            });
        }
    }
    for name in schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
    {
        if !given.is_some_and(|obj| obj.contains_key(name)) {
            violations.push(Violation::MissingRequiredParameter {
                parameter: name.to_string(),
            });
        }
    }

    if let Ok(validator) = jsonschema::validator_for(schema) {
        for e in validator.iter_errors(args) {
            if matches!(
                e.kind(),
                ValidationErrorKind::Required { .. } | ValidationErrorKind::AdditionalProperties { .. }
            ) {
                continue;
            }
            violations.push(Violation::ConstraintViolation {
                message: e.to_string(),
                instance_path: e.instance_path().to_string(),
            });
        }
    }

    let Some(first) = violations.first() else {
        return Ok(());
    };
    let message = match first {
        Violation::InvalidParameter {
            parameter,
            suggestions,
            ..
        } => match suggestions.first() {
            Some(s) => format!("Invalid params: unknown parameter '{parameter}' (did you mean '{s}'?)"),
            None => format!("Invalid params: unknown parameter '{parameter}'"),
        },
        Violation::MissingRequiredParameter { parameter } => {
            format!("Invalid params: missing required parameter '{parameter}'")
        }
        Violation::ConstraintViolation { .. } | Violation::DecodeError { .. } => format!(
            "Invalid params: validation failed with {} error(s)",
            violations.len()
        ),
    };
    Err(rejected(message, &violations))
}

/// Known parameter names close to `unknown`, best match first.
fn similar_names(unknown: &str, known: &[&str]) -> Vec<String> {
    let mut scored: Vec<(f64, &str)> = known
        .iter()
        .map(|k| (strsim::jaro(unknown, k), *k))
        .filter(|(score, _)| *score > 0.7)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, k)| k.to_string()).collect()
}
