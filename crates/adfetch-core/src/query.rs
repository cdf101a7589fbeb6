//! Query descriptions and their cache fingerprints.

use std::fmt::{Display, Formatter};

use serde_json::{Map, Value};

use crate::{ResourceId, ResourceKind, ValidationError};

/// Fields and parameters of one list query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    pub fields: Vec<String>,
    pub params: Map<String, Value>,
}

impl QuerySpec {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.fields.iter().any(|field| field.trim().is_empty()) {
            return Err(ValidationError::EmptyFieldName);
        }
        Ok(())
    }

    /// Comma-joined field list as sent in the `fields` parameter.
    pub fn fields_param(&self) -> String {
        self.fields.join(",")
    }
}

/// Deterministic cache key for a query.
///
/// Derived from the resource kind, the object the query is scoped to, the
/// field list in caller order, and the parameters serialized with keys
/// sorted at every nesting level. Two parameter maps that differ only in key
/// order fingerprint identically; values are compared as sent, so `"100"`
/// and `100` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryFingerprint(String);

impl QueryFingerprint {
    pub fn for_list(kind: ResourceKind, scope: &ResourceId, spec: &QuerySpec) -> Self {
        let mut key = format!("{}|{}|{}|", kind, scope, spec.fields_param());
        write_canonical_map(&mut key, &spec.params);
        Self(key)
    }

    pub fn for_object(kind: ResourceKind, id: &ResourceId, fields: &[String]) -> Self {
        Self(format!("{}|{}|{}|object", kind, id, fields.join(",")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the fingerprint textually references `id` as a whole token.
    pub fn mentions(&self, id: &ResourceId) -> bool {
        let needle = id.as_str();
        self.0.match_indices(needle).any(|(start, _)| {
            let before = self.0[..start].chars().next_back();
            let after = self.0[start + needle.len()..].chars().next();
            !before.is_some_and(is_id_char) && !after.is_some_and(is_id_char)
        })
    }
}

impl Display for QueryFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_id_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

fn write_canonical_map(out: &mut String, map: &Map<String, Value>) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (index, key) in keys.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(out, &map[key]);
    }
    out.push('}');
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => write_canonical_map(out, map),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
