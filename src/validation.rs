//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` against a [`Schema`] before any request is
//! sent to the Nango API, so malformed plans surface as path-addressed
//! diagnostics instead of opaque HTTP errors.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_nango::schema::{Attribute, Schema};
//! use hemmer_provider_nango::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0().with_attribute("unique_key", Attribute::required_string());
//!
//! assert!(validate(&schema, &json!({"unique_key": "github"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"unique_key": 7}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("unique_key".to_string()));
//! ```

use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema,
};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (provider sets these)
/// - Attribute types must match the schema
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let diagnostic =
                Diagnostic::error("Expected object").with_detail(format!("Got {}", type_name(value)));
            diagnostics.push(if path.is_empty() {
                diagnostic
            } else {
                diagnostic.with_attribute(path)
            });
            return;
        },
    };

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), &attr_path, diagnostics);
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested, obj.get(name), &block_path, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !value.is_i64() {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(element_type, item, &format!("{}.{}", path, i), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "list", value)),
        },
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let items: Vec<(String, &Value)> = match (nested.nesting_mode, value) {
        (_, None | Some(Value::Null)) => Vec::new(),
        (BlockNestingMode::Single, Some(v)) => vec![(path.to_string(), v)],
        (BlockNestingMode::List, Some(Value::Array(arr))) => arr
            .iter()
            .enumerate()
            .map(|(i, item)| (format!("{}.{}", path, i), item))
            .collect(),
        (BlockNestingMode::List, Some(v)) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", type_name(v)))
                    .with_attribute(path),
            );
            return;
        },
    };

    let len = items.len() as u32;
    if len < nested.min_items {
        let summary = if nested.nesting_mode == BlockNestingMode::Single {
            format!("Missing required block '{}'", path)
        } else {
            format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            )
        };
        diagnostics.push(Diagnostic::error(summary).with_attribute(path));
    }
    if nested.max_items > 0 && len > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, len
            ))
            .with_attribute(path),
        );
    }

    for (item_path, item) in items {
        validate_block(&nested.block, item, &item_path, diagnostics);
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, type_name(got)))
        .with_attribute(path)
}
