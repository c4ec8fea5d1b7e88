//! Pluggable payload validation.
//!
//! The engine never depends on a specific schema library; event type
//! definitions carry a [`Schema`] capability that parses a JSON value and
//! reports [`Issue`]s. This module also ships a small combinator
//! implementation of the capability ([`object`], [`string`], [`integer`],
//! [`number`], [`boolean`], [`array`], [`optional`], [`any`]) which covers
//! the shapes event payloads typically take; anything richer can be plugged
//! in by implementing [`Schema`] over an external validator.
//!
//! # Examples
//!
//! ```
//! use ledgercore::schema::{object, string, Schema};
//! use serde_json::json;
//!
//! let schema = object([
//!     ("name", object([("given", string()), ("family", string())])),
//!     ("email", string()),
//! ]);
//!
//! assert!(schema.parse(&json!({
//!     "name": { "given": "Ada", "family": "Lovelace" },
//!     "email": "ada@example.com",
//! })).is_ok());
//!
//! let issues = schema.parse(&json!({ "name": { "given": 1 } })).unwrap_err();
//! assert_eq!(issues.len(), 3);
//! ```

use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;

/// Marker prefixing every rendered issue line.
pub const ISSUE_MARKER: &str = "✖";

/// One step of a path into a JSON value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// An object key.
    Key(String),
    /// An array index.
    Index(usize),
}

/// A single validation issue at a path within the checked value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Path from the root of the checked value to the offending position.
    pub path: Vec<Segment>,
    /// Human-readable description of the problem.
    pub message: String,
}

impl Issue {
    /// Creates a root-level issue.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    /// Prepends a path segment, re-rooting the issue one level up.
    #[must_use]
    pub fn under(mut self, segment: Segment) -> Self {
        self.path.insert(0, segment);
        self
    }
}

/// Validation capability consumed by the event catalog.
///
/// `parse` returns all issues found, not just the first; the catalog renders
/// them into the sorted human-readable list carried by validation errors.
pub trait Schema: Send + Sync {
    /// Checks `value`, returning every issue found.
    ///
    /// # Errors
    ///
    /// The collected issues when the value does not conform.
    fn parse(&self, value: &Value) -> Result<(), Vec<Issue>>;

    /// Whether an absent value satisfies this schema. Consulted by
    /// [`object`] for missing keys.
    fn accepts_absent(&self) -> bool {
        false
    }
}

/// Shared handle to a schema.
pub type SchemaRef = Arc<dyn Schema>;

/// Renders issues as human-readable lines.
///
/// Lines are sorted by path depth ascending (stable for equal depths), each
/// prefixed with [`ISSUE_MARKER`]. Paths render in dotted notation; keys
/// containing `.` are bracket-escaped so the rendered path stays
/// unambiguous, e.g. `data["a.b"].c`.
pub fn render_issues(issues: &[Issue]) -> Vec<String> {
    let mut sorted: Vec<&Issue> = issues.iter().collect();
    sorted.sort_by_key(|issue| issue.path.len());
    sorted
        .into_iter()
        .map(|issue| {
            if issue.path.is_empty() {
                format!("{ISSUE_MARKER} {}", issue.message)
            } else {
                format!("{ISSUE_MARKER} {} at {}", issue.message, render_path(&issue.path))
            }
        })
        .collect()
}

fn render_path(path: &[Segment]) -> String {
    let mut out = String::new();
    for (position, segment) in path.iter().enumerate() {
        match segment {
            Segment::Key(key) if key.contains('.') => {
                let _ = write!(out, "[\"{key}\"]");
            }
            Segment::Key(key) => {
                if position > 0 {
                    out.push('.');
                }
                out.push_str(key);
            }
            Segment::Index(index) => {
                let _ = write!(out, "[{index}]");
            }
        }
    }
    out
}

/// Human name of a JSON value's type, used in issue messages.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct TypeSchema {
    expected: &'static str,
    check: fn(&Value) -> bool,
}

impl Schema for TypeSchema {
    fn parse(&self, value: &Value) -> Result<(), Vec<Issue>> {
        if (self.check)(value) {
            Ok(())
        } else {
            Err(vec![Issue::new(format!(
                "expected {}, got {}",
                self.expected,
                type_name(value)
            ))])
        }
    }
}

/// Accepts any string.
pub fn string() -> SchemaRef {
    Arc::new(TypeSchema {
        expected: "string",
        check: Value::is_string,
    })
}

/// Accepts any integer number.
pub fn integer() -> SchemaRef {
    Arc::new(TypeSchema {
        expected: "integer",
        check: |v| v.is_i64() || v.is_u64(),
    })
}

/// Accepts any number.
pub fn number() -> SchemaRef {
    Arc::new(TypeSchema {
        expected: "number",
        check: Value::is_number,
    })
}

/// Accepts any boolean.
pub fn boolean() -> SchemaRef {
    Arc::new(TypeSchema {
        expected: "boolean",
        check: Value::is_boolean,
    })
}

/// Accepts any value.
pub fn any() -> SchemaRef {
    Arc::new(TypeSchema {
        expected: "any value",
        check: |_| true,
    })
}

struct OptionalSchema {
    inner: SchemaRef,
}

impl Schema for OptionalSchema {
    fn parse(&self, value: &Value) -> Result<(), Vec<Issue>> {
        if value.is_null() {
            Ok(())
        } else {
            self.inner.parse(value)
        }
    }

    fn accepts_absent(&self) -> bool {
        true
    }
}

/// Wraps a schema so that `null` and absence both conform.
pub fn optional(inner: SchemaRef) -> SchemaRef {
    Arc::new(OptionalSchema { inner })
}

struct ArraySchema {
    item: SchemaRef,
}

impl Schema for ArraySchema {
    fn parse(&self, value: &Value) -> Result<(), Vec<Issue>> {
        let Value::Array(items) = value else {
            return Err(vec![Issue::new(format!(
                "expected array, got {}",
                type_name(value)
            ))]);
        };

        let mut issues = Vec::new();
        for (index, item) in items.iter().enumerate() {
            if let Err(item_issues) = self.item.parse(item) {
                issues.extend(
                    item_issues
                        .into_iter()
                        .map(|issue| issue.under(Segment::Index(index))),
                );
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Accepts arrays whose every item conforms to `item`.
pub fn array(item: SchemaRef) -> SchemaRef {
    Arc::new(ArraySchema { item })
}

struct ObjectSchema {
    fields: Vec<(String, SchemaRef)>,
}

impl Schema for ObjectSchema {
    fn parse(&self, value: &Value) -> Result<(), Vec<Issue>> {
        let Value::Object(map) = value else {
            return Err(vec![Issue::new(format!(
                "expected object, got {}",
                type_name(value)
            ))]);
        };

        let mut issues = Vec::new();
        for (key, field_schema) in &self.fields {
            match map.get(key) {
                Some(field_value) => {
                    if let Err(field_issues) = field_schema.parse(field_value) {
                        issues.extend(
                            field_issues
                                .into_iter()
                                .map(|issue| issue.under(Segment::Key(key.clone()))),
                        );
                    }
                }
                None if field_schema.accepts_absent() => {}
                None => {
                    issues.push(
                        Issue::new("missing required field").under(Segment::Key(key.clone())),
                    );
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Accepts objects carrying the given fields.
///
/// Unknown keys are ignored. A field wrapped in [`optional`] may be absent;
/// every other field is required.
pub fn object<const N: usize>(fields: [(&str, SchemaRef); N]) -> SchemaRef {
    Arc::new(ObjectSchema {
        fields: fields
            .into_iter()
            .map(|(key, schema)| (key.to_string(), schema))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_schemas_accept_and_reject() {
        assert!(string().parse(&json!("x")).is_ok());
        assert!(string().parse(&json!(1)).is_err());
        assert!(integer().parse(&json!(3)).is_ok());
        assert!(integer().parse(&json!(3.5)).is_err());
        assert!(number().parse(&json!(3.5)).is_ok());
        assert!(boolean().parse(&json!(true)).is_ok());
        assert!(any().parse(&json!(null)).is_ok());
    }

    #[test]
    fn object_reports_missing_and_mistyped_fields() {
        let schema = object([
            ("name", object([("given", string()), ("family", string())])),
            ("email", string()),
        ]);

        let issues = schema
            .parse(&json!({ "name": { "given": 1 }, "email": 7 }))
            .unwrap_err();

        assert_eq!(issues.len(), 3);
        assert!(issues.iter().any(|i| i.path
            == vec![Segment::Key("name".into()), Segment::Key("given".into())]
            && i.message == "expected string, got number"));
        assert!(issues.iter().any(|i| i.path
            == vec![Segment::Key("name".into()), Segment::Key("family".into())]
            && i.message == "missing required field"));
        assert!(issues
            .iter()
            .any(|i| i.path == vec![Segment::Key("email".into())]));
    }

    #[test]
    fn optional_fields_may_be_absent_or_null() {
        let schema = object([("nickname", optional(string()))]);
        assert!(schema.parse(&json!({})).is_ok());
        assert!(schema.parse(&json!({ "nickname": null })).is_ok());
        assert!(schema.parse(&json!({ "nickname": "Ada" })).is_ok());
        assert!(schema.parse(&json!({ "nickname": 1 })).is_err());
    }

    #[test]
    fn array_issues_carry_indexes() {
        let schema = array(string());
        let issues = schema.parse(&json!(["a", 1, "b", 2])).unwrap_err();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].path, vec![Segment::Index(1)]);
        assert_eq!(issues[1].path, vec![Segment::Index(3)]);
    }

    #[test]
    fn rendering_sorts_by_path_depth_ascending() {
        let issues = vec![
            Issue::new("deep")
                .under(Segment::Key("b".into()))
                .under(Segment::Key("a".into())),
            Issue::new("shallow").under(Segment::Key("a".into())),
            Issue::new("root"),
        ];

        let lines = render_issues(&issues);
        assert_eq!(
            lines,
            vec![
                "✖ root".to_string(),
                "✖ shallow at a".to_string(),
                "✖ deep at a.b".to_string(),
            ]
        );
    }

    #[test]
    fn rendering_escapes_keys_containing_dots() {
        let issues = vec![Issue::new("bad")
            .under(Segment::Key("c".into()))
            .under(Segment::Key("a.b".into()))
            .under(Segment::Key("data".into()))];

        let lines = render_issues(&issues);
        assert_eq!(lines, vec!["✖ bad at data[\"a.b\"].c".to_string()]);
    }

    #[test]
    fn rendering_mixes_keys_and_indexes() {
        let issues = vec![Issue::new("bad")
            .under(Segment::Key("given".into()))
            .under(Segment::Index(2))
            .under(Segment::Key("names".into()))];

        let lines = render_issues(&issues);
        assert_eq!(lines, vec!["✖ bad at names[2].given".to_string()]);
    }
}
