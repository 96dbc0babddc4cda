//! Mapping of index errors onto JSON-RPC errors.

use openapi_mcp_index::OpenApiIndexError;
use rmcp::model::{ErrorCode, ErrorData};

/// Convert a failed operation into the error returned for `tools/call`.
///
/// Startup-only variants never reach a request in practice; they surface as internal errors.
pub fn map_index_error(e: OpenApiIndexError) -> ErrorData {
    match e {
        OpenApiIndexError::OperationNotFound(name) => ErrorData::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("Tool not found: {name}"),
            None,
        ),
        OpenApiIndexError::InvalidArguments { message, data } => {
            ErrorData::invalid_params(message, Some(data))
        }
        OpenApiIndexError::ToolExecution(message) => {
            ErrorData::internal_error(format!("Tool execution failed: {message}"), None)
        }
        other => ErrorData::internal_error(other.to_string(), None),
    }
}
