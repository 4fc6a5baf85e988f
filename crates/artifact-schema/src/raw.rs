//! Raw submission records as read from disk, before validation.

use serde_json::Value;

/// An untyped submission record.
///
/// `key` is the identifier derived from where the record came from (the
/// file stem of `<slug>.json`); the validator requires it to equal the
/// record's own `slug`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Identifier derived from the record's file name.
    pub key: String,
    /// The parsed JSON document.
    pub value: Value,
}

impl RawRecord {
    /// Wrap a parsed document.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// The `slug` field if it is a string, without validating it.
    pub fn declared_slug(&self) -> Option<&str> {
        self.value.get("slug").and_then(Value::as_str)
    }

    /// The string entries of the `aliases` field, without validating them.
    pub fn declared_aliases(&self) -> impl Iterator<Item = &str> {
        self.value
            .get("aliases")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    /// The `id` field if it is a string, without validating it.
    pub fn declared_id(&self) -> Option<&str> {
        self.value.get("id").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn declared_fields_are_read_loosely() {
        let record = RawRecord::new(
            "some-artifact-slug",
            json!({"slug": "some-artifact-slug", "aliases": ["old-artifact-slug", 3], "id": 5}),
        );
        assert_eq!(record.declared_slug(), Some("some-artifact-slug"));
        assert_eq!(record.declared_aliases().collect::<Vec<_>>(), vec!["old-artifact-slug"]);
        assert_eq!(record.declared_id(), None);
    }

    #[test]
    fn missing_fields_yield_nothing() {
        let record = RawRecord::new("k", json!([]));
        assert_eq!(record.declared_slug(), None);
        assert_eq!(record.declared_aliases().count(), 0);
    }
}
