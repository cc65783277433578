use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A catalogue record: a unique identifier plus heterogeneous string fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: BTreeMap<String, String>,
}

impl Document {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), fields: BTreeMap::new() }
    }

    pub fn with_field<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Field value, treating an empty string the same as a missing field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn has(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Field value or `""`.
    pub fn field_or_empty(&self, name: &str) -> &str {
        self.field(name).unwrap_or("")
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.values().map(String::as_str)
    }

    /// All field values joined by a space and lower-cased.
    pub fn text_lower(&self) -> String {
        self.values().collect::<Vec<_>>().join(" ").to_lowercase()
    }
}

/// Names of the fields the ranking heuristics look at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub name: String,
    pub kind: String,
    pub brand: String,
    pub description: String,
    pub model: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            name: "Name".into(),
            kind: "Type".into(),
            brand: "Brand".into(),
            description: "Sales Package".into(),
            model: "Model Number".into(),
        }
    }
}

impl Schema {
    /// Name, type, brand and description: the fields whose presence counts as completeness.
    pub fn required(&self) -> [&str; 4] {
        [&self.name, &self.kind, &self.brand, &self.description]
    }

    pub fn completeness(&self, doc: &Document) -> f64 {
        let required = self.required();
        let present = required.iter().filter(|f| doc.has(f)).count();
        present as f64 / required.len() as f64
    }
}
