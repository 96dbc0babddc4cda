//! `OpenAPI` `$ref` resolver.
//!
//! Inlines internal references (`#/...`) into a copy of the document so that every query
//! sees fully expanded structures. Only the single loaded document is considered: references
//! into other files or URLs are kept as `$ref` nodes.
//!
//! Key detail: cycles are detected by **location**, not by reference string. While a target
//! is being expanded, the resolver knows every document location on the current expansion
//! path (the walk position plus each enclosing reference site). A reference pointing at one of
//! those locations, or at an ancestor of one, would expand forever, so that occurrence stays a
//! `$ref` node.
//!
//! Failure modes are split in two:
//! - per branch: unresolvable references (external, non-pointer fragments, legacy
//!   `#/definitions/...`, missing targets) are kept verbatim and logged once each;
//! - per document: expansion is bounded by a node budget. When a densely cross-referenced
//!   document exceeds it, the declared tree is returned unchanged and the outcome is marked
//!   [`ResolutionOutcome::Degraded`].

use crate::error::ParseError;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashSet;

const DEFAULT_MAX_RESOLVED_NODES: usize = 2_000_000;

/// Keys whose values are data rather than schema.
const LITERAL_KEYS: &[&str] = &["example", "default", "enum", "const"];

/// Keys whose values are maps keyed by property names.
const PROPERTY_MAP_KEYS: &[&str] = &["properties", "patternProperties"];

/// Keys whose values are maps keyed by user-chosen names.
const NAME_MAP_KEYS: &[&str] = &[
    "paths",
    "webhooks",
    "schemas",
    "responses",
    "parameters",
    "requestBodies",
    "headers",
    "securitySchemes",
    "links",
    "callbacks",
    "pathItems",
    "content",
    "encoding",
    "variables",
    "$defs",
    "dependentSchemas",
];

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Nodes produced while inlining before falling back to the declared document.
    pub max_resolved_nodes: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_resolved_nodes: DEFAULT_MAX_RESOLVED_NODES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Complete,
    /// References were not inlined at all; `reason` says why.
    Degraded { reason: String },
}

impl ResolutionOutcome {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, ResolutionOutcome::Degraded { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    pub inlined: usize,
    pub cyclic: usize,
    pub unresolved: usize,
}

#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    /// The document with internal references inlined.
    pub root: Value,
    /// The document as decoded, references untouched.
    pub declared: Value,
    pub outcome: ResolutionOutcome,
    pub stats: ResolutionStats,
}

/// Resolve every internal `$ref` in `tree`.
///
/// # Errors
///
/// Returns a [`ParseError`] if the root is not a mapping or a `$ref` value is not a non-empty
/// string.
pub fn resolve(tree: Value, options: &ResolverOptions) -> Result<ResolvedDocument, ParseError> {
    if !tree.is_object() {
        return Err(ParseError::new(format!(
            "document root must be an object, found {}",
            value_kind(&tree)
        )));
    }
    check_ref_syntax(&tree, Ctx::Node, "")?;

    let (expanded, stats) = {
        let mut resolver = Resolver {
            root: &tree,
            max_nodes: options.max_resolved_nodes,
            produced: 0,
            stats: ResolutionStats::default(),
            warned: HashSet::new(),
        };
        let mut active = Vec::new();
        let expanded = resolver.expand(&tree, Ctx::Node, "", &mut active);
        (expanded, resolver.stats)
    };

    match expanded {
        Ok(root) => {
            tracing::debug!(
                inlined = stats.inlined,
                cyclic = stats.cyclic,
                unresolved = stats.unresolved,
                "Resolved document references"
            );
            Ok(ResolvedDocument {
                root,
                declared: tree,
                outcome: ResolutionOutcome::Complete,
                stats,
            })
        }
        Err(BudgetExceeded) => {
            let reason = format!(
                "reference expansion exceeded {} nodes; references left unresolved",
                options.max_resolved_nodes
            );
            tracing::warn!("Degraded reference resolution: {reason}");
            Ok(ResolvedDocument {
                root: tree.clone(),
                declared: tree,
                outcome: ResolutionOutcome::Degraded { reason },
                stats: ResolutionStats::default(),
            })
        }
    }
}

/// Human-readable name of a JSON value's type.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// What the keys of the current mapping mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    /// An ordinary document node; `$ref` is a reference.
    Node,
    /// Keys are names (responses, components, paths); values are nodes, except `x-*` data.
    NameMap,
    /// Keys are property names, so `x-*` and `$ref` are ordinary names here.
    PropertyMap,
    /// Keys are example names; values are Example objects.
    ExampleMap,
    /// An Example object; its `value` is data.
    Example,
}

/// How a child value should be treated, given its key and the parent's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Child {
    Literal,
    Walk(Ctx),
}

fn classify_child(parent: Ctx, key: &str, value: &Value) -> Child {
    match parent {
        Ctx::NameMap if key.starts_with("x-") => Child::Literal,
        Ctx::NameMap | Ctx::PropertyMap => Child::Walk(Ctx::Node),
        Ctx::ExampleMap => Child::Walk(Ctx::Example),
        Ctx::Example if key == "value" => Child::Literal,
        Ctx::Node | Ctx::Example => {
            if key.starts_with("x-") || LITERAL_KEYS.contains(&key) {
                Child::Literal
            } else if key == "examples" {
                if value.is_object() {
                    Child::Walk(Ctx::ExampleMap)
                } else {
                    Child::Literal
                }
            } else if PROPERTY_MAP_KEYS.contains(&key) && value.is_object() {
                Child::Walk(Ctx::PropertyMap)
            } else if NAME_MAP_KEYS.contains(&key) && value.is_object() {
                Child::Walk(Ctx::NameMap)
            } else {
                Child::Walk(Ctx::Node)
            }
        }
    }
}

fn has_ref_semantics(ctx: Ctx) -> bool {
    matches!(ctx, Ctx::Node | Ctx::Example)
}

fn child_location(parent: &str, key: &str) -> String {
    format!("{parent}/{}", key.replace('~', "~0").replace('/', "~1"))
}

/// Percent-decode a URI fragment into the JSON pointer it spells (RFC 6901 section 6).
///
/// `None` when the decoded bytes are not UTF-8.
pub(crate) fn decode_fragment(fragment: &str) -> Option<Cow<'_, str>> {
    percent_decode_str(fragment).decode_utf8().ok()
}

/// `location` is `pointer` or lies beneath it.
fn is_within(location: &str, pointer: &str) -> bool {
    location == pointer
        || (location.starts_with(pointer) && location.as_bytes().get(pointer.len()) == Some(&b'/'))
}

fn check_ref_syntax(node: &Value, ctx: Ctx, location: &str) -> Result<(), ParseError> {
    match node {
        Value::Object(map) => {
            if has_ref_semantics(ctx)
                && let Some(r) = map.get("$ref")
            {
                match r {
                    Value::String(s) if s.trim().is_empty() => {
                        return Err(ParseError::new(format!("empty $ref at '{location}'")));
                    }
                    Value::String(_) => {}
                    other => {
                        return Err(ParseError::new(format!(
                            "$ref at '{location}' must be a string, found {}",
                            value_kind(other)
                        )));
                    }
                }
            }
            for (key, value) in map {
                if has_ref_semantics(ctx) && key == "$ref" {
                    continue;
                }
                if let Child::Walk(child_ctx) = classify_child(ctx, key, value) {
                    check_ref_syntax(value, child_ctx, &child_location(location, key))?;
                }
            }
            Ok(())
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                check_ref_syntax(item, ctx, &child_location(location, &i.to_string()))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Visit every `$ref` string in `node` that acts as a reference.
pub(crate) fn visit_refs<F: FnMut(&str)>(node: &Value, f: &mut F) {
    visit_refs_in(node, Ctx::Node, f);
}

fn visit_refs_in<F: FnMut(&str)>(node: &Value, ctx: Ctx, f: &mut F) {
    match node {
        Value::Object(map) => {
            if has_ref_semantics(ctx)
                && let Some(Value::String(reference)) = map.get("$ref")
            {
                f(reference);
            }
            for (key, value) in map {
                if has_ref_semantics(ctx) && key == "$ref" {
                    continue;
                }
                if let Child::Walk(child_ctx) = classify_child(ctx, key, value) {
                    visit_refs_in(value, child_ctx, f);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                visit_refs_in(item, ctx, f);
            }
        }
        _ => {}
    }
}

#[derive(Debug)]
struct BudgetExceeded;

/// Why a reference could not be followed.
enum Unresolvable {
    External,
    NotAPointer,
    Legacy,
    Missing,
}

impl Unresolvable {
    fn describe(&self) -> &'static str {
        match self {
            Unresolvable::External => "external references are not followed",
            Unresolvable::NotAPointer => "fragment is not a JSON pointer",
            Unresolvable::Legacy => "'#/definitions/' pointers are not supported",
            Unresolvable::Missing => "target does not exist",
        }
    }
}

struct Resolver<'a> {
    root: &'a Value,
    max_nodes: usize,
    produced: usize,
    stats: ResolutionStats,
    warned: HashSet<String>,
}

impl<'a> Resolver<'a> {
    fn produce(&mut self) -> Result<(), BudgetExceeded> {
        self.produced += 1;
        if self.produced > self.max_nodes {
            Err(BudgetExceeded)
        } else {
            Ok(())
        }
    }

    fn expand(
        &mut self,
        node: &Value,
        ctx: Ctx,
        location: &str,
        active: &mut Vec<String>,
    ) -> Result<Value, BudgetExceeded> {
        self.produce()?;
        match node {
            Value::Object(map) => {
                if has_ref_semantics(ctx)
                    && let Some(Value::String(reference)) = map.get("$ref")
                {
                    return self.expand_ref(map, reference, ctx, location, active);
                }
                self.expand_entries(map, ctx, location, active)
                    .map(Value::Object)
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let loc = child_location(location, &i.to_string());
                    out.push(self.expand(item, ctx, &loc, active)?);
                }
                Ok(Value::Array(out))
            }
            scalar => Ok(scalar.clone()),
        }
    }

    fn expand_entries(
        &mut self,
        map: &Map<String, Value>,
        ctx: Ctx,
        location: &str,
        active: &mut Vec<String>,
    ) -> Result<Map<String, Value>, BudgetExceeded> {
        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            let expanded = match classify_child(ctx, key, value) {
                Child::Literal => {
                    self.produce()?;
                    value.clone()
                }
                Child::Walk(child_ctx) => {
                    self.expand(value, child_ctx, &child_location(location, key), active)?
                }
            };
            out.insert(key.clone(), expanded);
        }
        Ok(out)
    }

    fn expand_ref(
        &mut self,
        map: &Map<String, Value>,
        reference: &str,
        ctx: Ctx,
        location: &str,
        active: &mut Vec<String>,
    ) -> Result<Value, BudgetExceeded> {
        let pointer = match self.locate(reference) {
            Ok(pointer) => pointer,
            Err(why) => {
                self.stats.unresolved += 1;
                if self.warned.insert(reference.to_string()) {
                    tracing::warn!(
                        "Unresolvable $ref '{reference}' at '{location}': {}",
                        why.describe()
                    );
                }
                return Ok(Value::Object(map.clone()));
            }
        };

        let circular =
            is_within(location, &pointer) || active.iter().any(|site| is_within(site, &pointer));
        if circular {
            self.stats.cyclic += 1;
            return Ok(Value::Object(map.clone()));
        }

        let root = self.root;
        let Some(target) = root.pointer(&pointer) else {
            return Ok(Value::Object(map.clone()));
        };

        self.stats.inlined += 1;
        active.push(location.to_string());
        let target_ctx = if ctx == Ctx::Example { Ctx::Example } else { Ctx::Node };
        let expanded = self.expand(target, target_ctx, &pointer, active);
        active.pop();
        let mut expanded = expanded?;

        let has_siblings = map.keys().any(|k| k != "$ref");
        if has_siblings && let Value::Object(target_map) = &mut expanded {
            let mut siblings = map.clone();
            siblings.remove("$ref");
            let overlay = self.expand_entries(&siblings, ctx, location, active)?;
            for (key, value) in overlay {
                target_map.insert(key, value);
            }
        }

        Ok(expanded)
    }

    /// The JSON pointer a reference names inside this document.
    fn locate<'r>(&self, reference: &'r str) -> Result<Cow<'r, str>, Unresolvable> {
        let Some(fragment) = reference.strip_prefix('#') else {
            return Err(Unresolvable::External);
        };
        let fragment = decode_fragment(fragment).ok_or(Unresolvable::NotAPointer)?;
        if !fragment.starts_with('/') {
            return Err(Unresolvable::NotAPointer);
        }
        if fragment.starts_with("/definitions/") {
            return Err(Unresolvable::Legacy);
        }
        if self.root.pointer(&fragment).is_none() {
            return Err(Unresolvable::Missing);
        }
        Ok(fragment)
    }
}
