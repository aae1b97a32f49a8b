//! Structural validation for backup import and restore.
//!
//! The catalog maps a collection name to a validator. Unknown collection
//! names pass without validation so newer exports remain importable. Live
//! CRUD writes are deliberately never validated here; domain services own
//! their own business validation and several of them depend on lenient
//! writes. Only externally supplied bundles are distrusted.

use crate::error::ValidationIssue;
use crate::store::document::ID_FIELD;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Object,
    Array,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Bool => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    kind: FieldKind,
    required: bool,
}

/// Structural validator for one collection. Declared fields are checked for
/// type; undeclared fields are permitted.
#[derive(Debug, Clone, Default)]
pub struct CollectionSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl CollectionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, field: &str, kind: FieldKind) -> Self {
        self.fields
            .insert(field.to_string(), FieldSpec { kind, required: true });
        self
    }

    pub fn optional(mut self, field: &str, kind: FieldKind) -> Self {
        self.fields
            .insert(field.to_string(), FieldSpec { kind, required: false });
        self
    }

    /// Returns every reason the record is rejected, empty when it passes.
    /// Optional fields accept explicit `null`; required fields do not.
    pub fn check(&self, record: &serde_json::Map<String, Value>) -> Vec<String> {
        let mut reasons = Vec::new();
        for (field, spec) in &self.fields {
            match record.get(field) {
                None | Some(Value::Null) if spec.required => {
                    reasons.push(format!("missing required field '{field}'"));
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.matches(value) => {
                    reasons.push(format!(
                        "field '{field}' must be a {}",
                        spec.kind.name()
                    ));
                }
                Some(_) => {}
            }
        }
        reasons
    }
}

/// Static mapping from collection name to validator.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, CollectionSchema>,
}

impl SchemaCatalog {
    /// A catalog that validates nothing. Structural checks (records must be
    /// objects, ids must be unique strings) still apply at import.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, collection: &str, schema: CollectionSchema) -> Self {
        self.schemas.insert(collection.to_string(), schema);
        self
    }

    pub fn schema(&self, collection: &str) -> Option<&CollectionSchema> {
        self.schemas.get(collection)
    }

    /// The built-in catalog for the CRM collections.
    pub fn crm_default() -> Self {
        Self::empty()
            .with_schema(
                "contacts",
                CollectionSchema::new()
                    .required("name", FieldKind::String)
                    .optional("email", FieldKind::String)
                    .optional("phone", FieldKind::String)
                    .optional("companyId", FieldKind::String)
                    .optional("tags", FieldKind::Array)
                    .optional("custom", FieldKind::Object),
            )
            .with_schema(
                "companies",
                CollectionSchema::new()
                    .required("name", FieldKind::String)
                    .optional("domain", FieldKind::String),
            )
            .with_schema(
                "deals",
                CollectionSchema::new()
                    .required("title", FieldKind::String)
                    .optional("amount", FieldKind::Number)
                    .optional("stage", FieldKind::String)
                    .optional("pipelineId", FieldKind::String)
                    .optional("contactId", FieldKind::String),
            )
            .with_schema(
                "pipelines",
                CollectionSchema::new()
                    .required("name", FieldKind::String)
                    .required("stages", FieldKind::Array),
            )
            .with_schema(
                "tasks",
                CollectionSchema::new()
                    .required("title", FieldKind::String)
                    .optional("dueAt", FieldKind::String)
                    .optional("done", FieldKind::Bool)
                    .optional("assigneeId", FieldKind::String),
            )
            .with_schema(
                "messages",
                CollectionSchema::new()
                    .required("channelId", FieldKind::String)
                    .required("direction", FieldKind::String)
                    .optional("body", FieldKind::String)
                    .optional("contactId", FieldKind::String),
            )
            .with_schema(
                "channels",
                CollectionSchema::new()
                    .required("kind", FieldKind::String)
                    .required("name", FieldKind::String)
                    .optional("settings", FieldKind::Object),
            )
            .with_schema(
                "webhooks",
                CollectionSchema::new()
                    .required("url", FieldKind::String)
                    .optional("events", FieldKind::Array)
                    .optional("active", FieldKind::Bool),
            )
            .with_schema(
                "automation_rules",
                CollectionSchema::new()
                    .required("name", FieldKind::String)
                    .required("trigger", FieldKind::Object)
                    .required("actions", FieldKind::Array)
                    .optional("enabled", FieldKind::Bool),
            )
    }

    /// Validates a candidate set of collections in full. Never
    /// short-circuits: every offending record produces an issue so callers
    /// see the complete picture at once.
    pub fn validate_collections(
        &self,
        collections: &BTreeMap<String, Vec<Value>>,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (collection, records) in collections {
            let schema = self.schema(collection);
            let mut seen_ids: HashSet<&str> = HashSet::new();
            for (index, record) in records.iter().enumerate() {
                let Some(obj) = record.as_object() else {
                    issues.push(ValidationIssue {
                        collection: collection.clone(),
                        index,
                        message: "record must be a JSON object".into(),
                    });
                    continue;
                };
                match obj.get(ID_FIELD) {
                    None | Some(Value::Null) => {}
                    Some(Value::String(id)) => {
                        if !seen_ids.insert(id.as_str()) {
                            issues.push(ValidationIssue {
                                collection: collection.clone(),
                                index,
                                message: format!("duplicate id '{id}'"),
                            });
                        }
                    }
                    Some(_) => issues.push(ValidationIssue {
                        collection: collection.clone(),
                        index,
                        message: "field 'id' must be a string".into(),
                    }),
                }
                if let Some(schema) = schema {
                    for message in schema.check(obj) {
                        issues.push(ValidationIssue {
                            collection: collection.clone(),
                            index,
                            message,
                        });
                    }
                }
            }
        }
        issues
    }
}
