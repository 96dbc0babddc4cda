//! MCP server surface: one read-only tool per registered query operation.

use crate::error::map_index_error;
use openapi_mcp_index::{Index, OperationRegistry, QueryEngine};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, ErrorData, Implementation, JsonObject,
    ListToolsResult, PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo,
    Tool, ToolAnnotations,
};
use rmcp::{ServerHandler, service::RequestContext};
use serde_json::Value;
use std::sync::Arc;

pub const SERVER_NAME: &str = "openapi-mcp";

#[derive(Debug, Clone)]
pub struct OpenApiMcpServer {
    registry: OperationRegistry,
    tools: Arc<Vec<Tool>>,
    instructions: Arc<str>,
}

impl OpenApiMcpServer {
    #[must_use]
    pub fn new(index: Index) -> Self {
        let instructions = instructions_for(&index);
        let registry = OperationRegistry::new(QueryEngine::new(Arc::new(index)));
        let tools = registry
            .list()
            .into_iter()
            .map(|op| {
                let schema = match op.input_schema {
                    Value::Object(map) => map,
                    _ => JsonObject::new(),
                };
                let mut tool = Tool::new(op.name, op.description, Arc::new(schema));
                tool.annotations = Some(ToolAnnotations {
                    read_only_hint: Some(true),
                    destructive_hint: Some(false),
                    idempotent_hint: Some(true),
                    open_world_hint: Some(false),
                    ..Default::default()
                });
                tool
            })
            .collect();

        Self {
            registry,
            tools: Arc::new(tools),
            instructions: instructions.into(),
        }
    }

    /// Tools in registration order.
    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Run one tool and wrap its pretty-printed result as a single text item.
    ///
    /// # Errors
    ///
    /// Returns method-not-found for an unknown tool, invalid-params when the arguments do not
    /// match the tool's input schema, and an internal error when the lookup misses.
    pub fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ErrorData> {
        let args = arguments.map_or(Value::Null, Value::Object);
        let result = self.registry.invoke(name, args).map_err(|e| {
            tracing::debug!(tool = name, error = %e, "Tool call failed");
            map_index_error(e)
        })?;
        let text = serde_json::to_string_pretty(&result)
            .map_err(|e| ErrorData::internal_error(format!("Tool execution failed: {e}"), None))?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

fn instructions_for(index: &Index) -> String {
    let info = index.info();
    let mut out = format!(
        "Read-only query tools for the '{}' API (version {}): {} endpoints, {} schemas.",
        info.title,
        info.version,
        index.endpoints().len(),
        index.schemas().len()
    );
    out.push_str(
        "\nStart with get_api_info, narrow down with list_endpoints or search_endpoints, then \
         call get_endpoint_details. Use list_schemas and get_schema_details for data models.",
    );
    out
}

impl ServerHandler for OpenApiMcpServer {
    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tools.as_ref().clone(),
            ..Default::default()
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        std::future::ready(self.call(&request.name, request.arguments))
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            protocol_version: ProtocolVersion::LATEST,
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("OpenAPI query server".to_string()),
                ..Default::default()
            },
            instructions: Some(self.instructions.to_string()),
        }
    }
}
