//! In-memory query index over a single `OpenAPI` document.
//!
//! Pipeline: [`loader`] fetches and decodes the document, [`resolver`] inlines internal
//! `$ref`s (tolerating cycles), [`index`] extracts endpoints and schemas, and [`query`] answers
//! read-only questions about them. [`registry`] exposes the queries as named operations with
//! JSON Schema input shapes, which is all the MCP server needs.
//!
//! It contains **no** transport code; the stdio server lives in `openapi-mcp-server`.

pub mod config;
pub mod error;
pub mod index;
pub mod loader;
pub mod query;
pub mod registry;
pub mod resolver;
pub mod startup;

pub use config::{HashPolicy, SourceConfig};
pub use error::{IndexError, LoadError, OpenApiIndexError, ParseError, Result};
pub use index::{HttpMethod, Index};
pub use query::QueryEngine;
pub use registry::{OperationDescriptor, OperationKind, OperationRegistry};
pub use startup::load_index;
