//! Documents, collection paths, query filters and write batches.
//!
//! These are the store-agnostic shapes every `DocumentStore` works with.
//! Field maps are plain JSON objects with camelCase keys.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::StoreError;

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

/// Field stamped by the store with the commit time on creation.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Maximum number of writes accepted in one atomic commit.
/// Matches the Firestore commit limit so both stores reject the same batches.
pub const MAX_BATCH_WRITES: usize = 500;

/// Maximum number of values in a set-membership filter.
pub const MAX_IN_FILTER_VALUES: usize = 30;

/// The two per-user collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Books,
    Answers,
}

impl Collection {
    pub fn collection_id(&self) -> &'static str {
        match self {
            Collection::Books => "answerBooks",
            Collection::Answers => "answers",
        }
    }
}

/// Location of one per-user collection:
/// `artifacts/{app_id}/users/{user_id}/{collection_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    app_id: String,
    user_id: String,
    collection: Collection,
}

impl CollectionPath {
    pub fn new(app_id: impl Into<String>, user_id: impl Into<String>, collection: Collection) -> Self {
        Self {
            app_id: app_id.into(),
            user_id: user_id.into(),
            collection,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Parent document path that owns the collection.
    pub fn parent(&self) -> String {
        format!("artifacts/{}/users/{}", self.app_id, self.user_id)
    }

    /// Relative path of a document inside this collection.
    pub fn document_path(&self, id: &str) -> String {
        format!("{}/{}", self, id)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent(), self.collection.collection_id())
    }
}

/// A stored document: its id plus field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Deserialize into a model type; the document id is exposed as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut map = self.fields.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

/// Single-field filter supported by every store.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equals { field: String, value: Value },
    In { field: String, values: Vec<Value> },
}

impl Filter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Filter::Equals { field, value } => fields.get(field) == Some(value),
            Filter::In { field, values } => fields
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
        }
    }
}

/// A collection scan with an optional filter. Results come back in store
/// order; callers never re-sort them.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filter: Option<Filter>,
}

impl Query {
    pub fn all(collection: CollectionPath) -> Self {
        Self {
            collection,
            filter: None,
        }
    }

    pub fn filtered(collection: CollectionPath, filter: Filter) -> Self {
        Self {
            collection,
            filter: Some(filter),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.filter.as_ref().map(|f| f.matches(fields)).unwrap_or(true)
    }

    /// Reject filters the remote store would refuse.
    pub fn validate(&self) -> Result<(), StoreError> {
        if let Some(Filter::In { values, .. }) = &self.filter {
            if values.is_empty() || values.len() > MAX_IN_FILTER_VALUES {
                return Err(StoreError::InvalidQuery(format!(
                    "membership filter needs 1..={} values, got {}",
                    MAX_IN_FILTER_VALUES,
                    values.len()
                )));
            }
        }
        Ok(())
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create a document that must not exist yet; `createdAt` is stamped.
    Create {
        collection: CollectionPath,
        id: String,
        fields: Fields,
    },
    /// Merge fields into a document that must exist.
    Update {
        collection: CollectionPath,
        id: String,
        fields: Fields,
    },
    Delete {
        collection: CollectionPath,
        id: String,
    },
}

impl Write {
    pub fn collection(&self) -> &CollectionPath {
        match self {
            Write::Create { collection, .. }
            | Write::Update { collection, .. }
            | Write::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Write::Create { id, .. } | Write::Update { id, .. } | Write::Delete { id, .. } => id,
        }
    }
}

/// Writes applied together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, collection: &CollectionPath, id: impl Into<String>, fields: Fields) -> &mut Self {
        self.writes.push(Write::Create {
            collection: collection.clone(),
            id: id.into(),
            fields,
        });
        self
    }

    pub fn update(&mut self, collection: &CollectionPath, id: impl Into<String>, fields: Fields) -> &mut Self {
        self.writes.push(Write::Update {
            collection: collection.clone(),
            id: id.into(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, collection: &CollectionPath, id: impl Into<String>) -> &mut Self {
        self.writes.push(Write::Delete {
            collection: collection.clone(),
            id: id.into(),
        });
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.writes.len() > MAX_BATCH_WRITES {
            return Err(StoreError::BatchTooLarge {
                len: self.writes.len(),
                max: MAX_BATCH_WRITES,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_collection_path_display() {
        let path = CollectionPath::new("app", "u1", Collection::Books);
        assert_eq!(path.to_string(), "artifacts/app/users/u1/answerBooks");
        assert_eq!(path.parent(), "artifacts/app/users/u1");
        assert_eq!(
            path.document_path("b1"),
            "artifacts/app/users/u1/answerBooks/b1"
        );
    }

    #[test]
    fn test_filter_matches() {
        let doc = fields(json!({"bookId": "b1", "isDefault": true}));
        assert!(Filter::equals("bookId", "b1").matches(&doc));
        assert!(!Filter::equals("bookId", "b2").matches(&doc));
        assert!(Filter::equals("isDefault", true).matches(&doc));
        assert!(Filter::is_in("bookId", ["b0", "b1"]).matches(&doc));
        assert!(!Filter::is_in("bookId", ["b2"]).matches(&doc));
        // Missing field never matches
        assert!(!Filter::equals("name", "x").matches(&doc));
    }

    #[test]
    fn test_query_validate_membership_limit() {
        let path = CollectionPath::new("app", "u1", Collection::Answers);
        let ok = Query::filtered(path.clone(), Filter::is_in("bookId", ["a"]));
        assert!(ok.validate().is_ok());

        let empty = Query::filtered(path.clone(), Filter::is_in::<&str>("bookId", []));
        assert!(empty.validate().is_err());

        let ids: Vec<String> = (0..31).map(|i| i.to_string()).collect();
        let too_many = Query::filtered(path, Filter::is_in("bookId", ids));
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn test_document_decode_injects_id() {
        #[derive(serde::Deserialize)]
        struct Named {
            id: String,
            name: String,
        }
        let doc = Document::new("d1", fields(json!({"name": "n"})));
        let named: Named = doc.decode().unwrap();
        assert_eq!(named.id, "d1");
        assert_eq!(named.name, "n");
    }

    #[test]
    fn test_batch_size_limit() {
        let path = CollectionPath::new("app", "u1", Collection::Answers);
        let mut batch = WriteBatch::new();
        for i in 0..=MAX_BATCH_WRITES {
            batch.delete(&path, i.to_string());
        }
        assert!(matches!(
            batch.validate(),
            Err(StoreError::BatchTooLarge { len: 501, max: 500 })
        ));
    }
}
