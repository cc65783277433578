//! Reads catalogue records from `.json` arrays, `.jsonl` files or directories of both.

use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{Result, SearchError};

/// Running record counter; used to synthesise missing ids.
#[derive(Default)]
struct Ingest {
    docs: Vec<Document>,
    position: usize,
    skipped: usize,
}

impl Ingest {
    fn push(&mut self, value: Value) {
        let position = self.position;
        self.position += 1;
        match value {
            Value::Object(map) => self.docs.push(record_to_document(map, position)),
            other => {
                self.skipped += 1;
                tracing::warn!(position, kind = value_kind(&other), "skipping record that is not an object");
            }
        }
    }

    fn finish(self, source: &str) -> Result<Vec<Document>> {
        if self.skipped > 0 {
            tracing::warn!(skipped = self.skipped, source, "filtered out invalid records");
        }
        if self.docs.is_empty() {
            return Err(SearchError::data_load(format!("no documents found in {source}")));
        }
        tracing::info!(num_docs = self.docs.len(), source, "dataset loaded");
        Ok(self.docs)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn record_to_document(mut map: Map<String, Value>, position: usize) -> Document {
    let id = map
        .remove("id")
        .and_then(scalar_to_string)
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("product_{position}"));
    let mut doc = Document::new(id);
    for (key, value) in map {
        if let Some(text) = scalar_to_string(value) {
            doc.fields.insert(key, text);
        }
    }
    doc
}

/// Documents from an already parsed JSON value, which must be an array of records.
pub fn documents_from_value(value: Value) -> Result<Vec<Document>> {
    let records = match value {
        Value::Array(records) => records,
        other => {
            return Err(SearchError::data_load(format!("expected an array of records, got {}", value_kind(&other))));
        }
    };
    if records.is_empty() {
        return Err(SearchError::data_load("dataset is empty"));
    }
    let mut ingest = Ingest::default();
    records.into_iter().for_each(|r| ingest.push(r));
    ingest.finish("<memory>")
}

fn is_dataset_file(path: &Path) -> bool {
    matches!(path.extension().and_then(|s| s.to_str()), Some("json" | "jsonl"))
}

/// Loads every record under `path`. Directories are walked recursively in
/// file-name order.
pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let source = path.display().to_string();
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && is_dataset_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
    } else if path.is_file() {
        files.push(path.to_path_buf());
    } else {
        return Err(SearchError::data_load(format!("dataset not found: {source}")));
    }

    let mut ingest = Ingest::default();
    for file in &files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(file, &mut ingest)?;
        } else {
            read_json(file, &mut ingest)?;
        }
    }
    ingest.finish(&source)
}

fn open(file: &Path) -> Result<BufReader<File>> {
    File::open(file)
        .map(BufReader::new)
        .map_err(|e| SearchError::data_load(format!("cannot open {}: {e}", file.display())))
}

fn read_json(file: &Path, ingest: &mut Ingest) -> Result<()> {
    let value: Value = serde_json::from_reader(open(file)?)
        .map_err(|e| SearchError::data_load(format!("invalid JSON in {}: {e}", file.display())))?;
    let records = match value {
        Value::Array(records) => records,
        other => {
            return Err(SearchError::data_load(format!(
                "expected an array of records in {}, got {}",
                file.display(),
                value_kind(&other)
            )));
        }
    };
    records.into_iter().for_each(|r| ingest.push(r));
    Ok(())
}

fn read_jsonl(file: &Path, ingest: &mut Ingest) -> Result<()> {
    for (line_no, line) in open(file)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line).map_err(|e| {
            SearchError::data_load(format!("invalid JSON on line {} of {}: {e}", line_no + 1, file.display()))
        })?;
        ingest.push(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_synthesised_and_scalars_stringified() {
        let docs = documents_from_value(json!([
            {"id": "a", "Name": "Speaker", "Rating": 4.5, "InStock": true, "Tags": ["x"], "Extra": null},
            "not a record",
            {"Name": "Cable", "id": ""},
            {"id": 42, "Name": "Adapter"}
        ]))
        .unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].field("Rating"), Some("4.5"));
        assert_eq!(docs[0].field("InStock"), Some("true"));
        assert!(docs[0].field("Tags").is_none());
        assert!(!docs[0].fields.contains_key("id"));
        assert_eq!(docs[1].id, "product_2");
        assert_eq!(docs[2].id, "42");
    }

    #[test]
    fn rejects_non_arrays_and_empty_input() {
        assert!(matches!(documents_from_value(json!({"id": "a"})), Err(SearchError::DataLoad(_))));
        assert!(matches!(documents_from_value(json!([])), Err(SearchError::DataLoad(_))));
        assert!(matches!(documents_from_value(json!([1, 2])), Err(SearchError::DataLoad(_))));
    }

    #[test]
    fn missing_path_is_a_load_error() {
        assert!(matches!(load_path("/definitely/not/here.json"), Err(SearchError::DataLoad(_))));
    }
}
