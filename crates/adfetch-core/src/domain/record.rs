use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ResourceId, ResourceKind};
use crate::ValidationError;

/// Fields naming the object an insight row belongs to, most specific first.
const INSIGHT_OBJECT_FIELDS: [&str; 4] = ["ad_id", "adset_id", "campaign_id", "account_id"];

/// One remote object and the fields that were requested for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    id: ResourceId,
    kind: ResourceKind,
    fields: Map<String, Value>,
}

impl ResourceRecord {
    pub fn new(kind: ResourceKind, id: ResourceId, fields: Map<String, Value>) -> Self {
        Self { id, kind, fields }
    }

    /// Builds a record from one element of a response `data` array.
    ///
    /// Insight rows carry no `id` of their own; they are keyed by the object
    /// they were aggregated for plus their `date_start`.
    pub fn from_json(kind: ResourceKind, value: Value) -> Result<Self, ValidationError> {
        let fields = match value {
            Value::Object(fields) => fields,
            _ => return Err(ValidationError::RecordNotObject),
        };

        let id = match fields.get("id").and_then(value_as_id) {
            Some(id) => ResourceId::parse(&id)?,
            None if kind == ResourceKind::InsightRow => synthesize_insight_id(&fields)?,
            None => return Err(ValidationError::EmptyResourceId),
        };

        Ok(Self { id, kind, fields })
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Id of the owning parent, read from the kind's parent field.
    pub fn parent_id(&self) -> Option<ResourceId> {
        let field = self.kind.parent_field()?;
        self.fields
            .get(field)
            .and_then(value_as_id)
            .and_then(|raw| ResourceId::parse(&raw).ok())
    }

    /// Id of the object an insight row was aggregated for.
    pub fn insight_object_id(&self) -> Option<ResourceId> {
        INSIGHT_OBJECT_FIELDS
            .iter()
            .find_map(|field| self.fields.get(*field).and_then(value_as_id))
            .and_then(|raw| ResourceId::parse(&raw).ok())
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn synthesize_insight_id(fields: &Map<String, Value>) -> Result<ResourceId, ValidationError> {
    let object = INSIGHT_OBJECT_FIELDS
        .iter()
        .find_map(|field| fields.get(*field).and_then(value_as_id))
        .ok_or(ValidationError::EmptyResourceId)?;
    let id = match fields.get("date_start").and_then(Value::as_str) {
        Some(date) => format!("{object}:{date}"),
        None => object,
    };
    ResourceId::parse(&id)
}
