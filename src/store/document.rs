use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

/// A stored record: a JSON object mapping field names to values.
pub type Document = serde_json::Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

pub fn doc_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

/// Assigns `id`, `createdAt` and `updatedAt` when absent. Present values are
/// kept so imported records keep their identity across versions.
pub(crate) fn stamp_new(doc: &mut Document) {
    if doc_id(doc).is_none() {
        doc.insert(ID_FIELD.into(), Value::String(fresh_id()));
    }
    let now = now_iso8601();
    if !doc.contains_key(CREATED_AT_FIELD) {
        doc.insert(CREATED_AT_FIELD.into(), Value::String(now.clone()));
    }
    if !doc.contains_key(UPDATED_AT_FIELD) {
        doc.insert(UPDATED_AT_FIELD.into(), Value::String(now));
    }
}

/// Shallow merge: patch fields replace, an explicit JSON `null` clears the
/// field, omitted fields are untouched. `id` and `createdAt` never move under
/// a patch; `updatedAt` is refreshed.
pub(crate) fn apply_patch(doc: &mut Document, patch: &Document) {
    for (field, value) in patch {
        if field == ID_FIELD || field == CREATED_AT_FIELD || field == UPDATED_AT_FIELD {
            continue;
        }
        if value.is_null() {
            doc.remove(field);
        } else {
            doc.insert(field.clone(), value.clone());
        }
    }
    doc.insert(UPDATED_AT_FIELD.into(), Value::String(now_iso8601()));
}
