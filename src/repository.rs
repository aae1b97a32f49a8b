//! Typed access to a single collection.
//!
//! Domain services that know their record shape use a [`Repository<T>`]
//! instead of raw documents: the collection name comes from the [`Entity`]
//! implementation and predicates are plain typed closures. Everything
//! delegates to the untyped [`DocStore`], so typed and untyped access see
//! the same data.

use crate::error::DocDbError;
use crate::store::document::Document;
use crate::store::DocStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// A record type bound to one collection.
pub trait Entity: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;
}

/// A stored record: the entity's own fields plus store-assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub id: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(flatten)]
    pub data: T,
}

pub struct Repository<T: Entity> {
    store: Arc<DocStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub fn insert(&self, value: T) -> Result<Stored<T>, DocDbError> {
        let doc = encode(&value)?;
        let stored = self.store.insert(T::COLLECTION, doc)?;
        decode(stored)
    }

    pub fn get(&self, id: &str) -> Result<Option<Stored<T>>, DocDbError> {
        self.store
            .get_by_id(T::COLLECTION, id)
            .map(decode)
            .transpose()
    }

    pub fn all(&self) -> Result<Vec<Stored<T>>, DocDbError> {
        self.store
            .get_all(T::COLLECTION)
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Typed filter over the collection, in insertion order. Documents that
    /// do not decode as `T` are a `Decode` error: the typed layer demands a
    /// homogeneous collection.
    pub fn find(
        &self,
        predicate: impl Fn(&Stored<T>) -> bool,
    ) -> Result<Vec<Stored<T>>, DocDbError> {
        let mut out = Vec::new();
        for doc in self.store.get_all(T::COLLECTION) {
            let stored = decode(doc)?;
            if predicate(&stored) {
                out.push(stored);
            }
        }
        Ok(out)
    }

    pub fn find_one(
        &self,
        predicate: impl Fn(&Stored<T>) -> bool,
    ) -> Result<Option<Stored<T>>, DocDbError> {
        Ok(self.find(predicate)?.into_iter().next())
    }

    /// Shallow-merge patch with the store's null-clears semantics. The
    /// patch must be a JSON object.
    pub fn update(&self, id: &str, patch: Value) -> Result<Option<Stored<T>>, DocDbError> {
        let Value::Object(patch) = patch else {
            return Err(DocDbError::Validation("patch must be a JSON object".into()));
        };
        self.store
            .update(T::COLLECTION, id, &patch)
            .map(decode)
            .transpose()
    }

    pub fn delete(&self, id: &str) -> bool {
        self.store.delete(T::COLLECTION, id)
    }

    pub fn count(&self) -> usize {
        self.store.count(T::COLLECTION)
    }
}

fn encode<T: Entity>(value: &T) -> Result<Document, DocDbError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(DocDbError::Encode(format!(
            "entity for collection '{}' must serialize to a JSON object",
            T::COLLECTION
        ))),
        Err(e) => Err(DocDbError::Encode(e.to_string())),
    }
}

fn decode<T: Entity>(doc: Document) -> Result<Stored<T>, DocDbError> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| {
        DocDbError::Decode(format!("collection '{}': {e}", T::COLLECTION))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocDbConfig;
    use serde_json::json;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Contact {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    }

    impl Entity for Contact {
        const COLLECTION: &'static str = "contacts";
    }

    fn open_store(dir: &std::path::Path) -> Arc<DocStore> {
        let config = DocDbConfig::new(dir.join("data"), dir.join("backups"));
        Arc::new(DocStore::open(&config).expect("open"))
    }

    #[test]
    fn typed_roundtrip_through_untyped_store() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(dir.path());
        let repo = Repository::<Contact>::new(Arc::clone(&store));
        let stored = repo
            .insert(Contact {
                name: "Ada".into(),
                email: Some("ada@x.io".into()),
            })
            .expect("insert");
        assert!(!stored.id.is_empty());

        // Visible through the untyped surface under the same collection.
        let raw = store.get_by_id("contacts", &stored.id).expect("raw");
        assert_eq!(raw.get("name"), Some(&json!("Ada")));

        let fetched = repo.get(&stored.id).expect("get").expect("some");
        assert_eq!(fetched.data, stored.data);
    }

    #[test]
    fn typed_find_uses_predicate_in_order() {
        let dir = tempdir().expect("tempdir");
        let repo = Repository::<Contact>::new(open_store(dir.path()));
        for name in ["Ada", "Grace", "Alan"] {
            repo.insert(Contact {
                name: name.into(),
                email: None,
            })
            .expect("insert");
        }
        let starts_with_a = repo
            .find(|c| c.data.name.starts_with('A'))
            .expect("find");
        let names: Vec<&str> = starts_with_a.iter().map(|c| c.data.name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Alan"]);
    }

    #[test]
    fn typed_update_clears_with_null() {
        let dir = tempdir().expect("tempdir");
        let repo = Repository::<Contact>::new(open_store(dir.path()));
        let stored = repo
            .insert(Contact {
                name: "Ada".into(),
                email: Some("ada@x.io".into()),
            })
            .expect("insert");
        let updated = repo
            .update(&stored.id, json!({"email": null}))
            .expect("update")
            .expect("some");
        assert_eq!(updated.data.email, None);
        assert!(repo.update("missing", json!({})).expect("ok").is_none());
    }
}
