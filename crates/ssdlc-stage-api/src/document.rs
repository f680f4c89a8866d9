use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A stage's output. Opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(serde_json::Value);

impl Document {
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self)
    }

    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.0)
    }
}

impl From<serde_json::Value> for Document {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Keyed documents produced so far in one session.
///
/// Last write wins; the core never deletes.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    docs: HashMap<String, Document>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite.
    pub fn put(&mut self, key: impl Into<String>, document: Document) {
        self.docs.insert(key.into(), document);
    }

    /// `None` when nothing is stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Document> {
        self.docs.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.docs.contains_key(key)
    }

    /// Known keys, in no particular order.
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        self.docs.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_overwrites() {
        let mut store = DocumentStore::new();
        store.put("system_design", Document::new(json!({"v": 1})));
        store.put("system_design", Document::new(json!({"v": 2})));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("system_design").unwrap().value()["v"], 2);
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = DocumentStore::new();
        assert!(store.get("interview_results").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_keys() {
        let mut store = DocumentStore::new();
        store.put("a", Document::new(json!(1)));
        store.put("b", Document::new(json!(2)));

        let mut keys = store.list();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_document_serializes_transparently() {
        let doc = Document::new(json!({"x": [1, 2]}));
        assert_eq!(serde_json::to_string(&doc).unwrap(), r#"{"x":[1,2]}"#);
        assert_eq!(Document::from_json_str(r#"{"x":[1,2]}"#).unwrap(), doc);
    }
}
