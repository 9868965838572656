//! Record normalization
//!
//! A [`Normalizer`] turns one raw snapshot record into named row-sets, one
//! per destination table. The batch loader treats it as a black box: table
//! names it does not know for the entity kind are dropped, and a `None`
//! result means "skip this record".

mod authors;
mod organizations;
mod taxonomy;
mod works;

use crate::entity::EntityKind;
use crate::error::{IngestError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Column name to value
pub type Row = BTreeMap<String, Value>;

/// Destination table name to the rows produced for it
pub type RowSets = BTreeMap<String, RowSet>;

/// Rows a record contributes to one table
#[derive(Debug, Clone, PartialEq)]
pub enum RowSet {
    One(Row),
    Many(Vec<Row>),
}

impl RowSet {
    pub fn into_vec(self) -> Vec<Row> {
        match self {
            RowSet::One(row) => vec![row],
            RowSet::Many(rows) => rows,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowSet::One(_) => 1,
            RowSet::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Maps raw records to row-sets
pub trait Normalizer: Send + Sync {
    /// `Ok(None)` skips the record without counting it as an error
    fn normalize(&self, kind: EntityKind, record: &Value) -> Result<Option<RowSets>>;
}

/// Field mappings for the OpenAlex snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAlexNormalizer;

impl Normalizer for OpenAlexNormalizer {
    fn normalize(&self, kind: EntityKind, record: &Value) -> Result<Option<RowSets>> {
        let Some(object) = record.as_object() else {
            return Err(IngestError::Normalize(format!(
                "expected a JSON object, got {}",
                json_kind(record)
            )));
        };
        let Some(id) = record_id(object) else {
            return Ok(None);
        };

        let sets = match kind {
            EntityKind::Domains => taxonomy::domain(&id, object),
            EntityKind::Fields => taxonomy::field(&id, object),
            EntityKind::Subfields => taxonomy::subfield(&id, object),
            EntityKind::Topics => taxonomy::topic(&id, object),
            EntityKind::Publishers => organizations::publisher(&id, object),
            EntityKind::Institutions => organizations::institution(&id, object),
            EntityKind::Sources => organizations::source(&id, object),
            EntityKind::Authors => authors::author(&id, object),
            EntityKind::Works => works::work(&id, object),
        };
        Ok(Some(sets))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn record_id(object: &Map<String, Value>) -> Option<String> {
    match object.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

// ============================================================================
// Mapping helpers shared by the per-kind modules
// ============================================================================

/// Value at `key`, or null
pub(crate) fn get(object: &Map<String, Value>, key: &str) -> Value {
    object.get(key).cloned().unwrap_or(Value::Null)
}

/// Value at a JSON pointer below `object`, or null
pub(crate) fn at(object: &Map<String, Value>, pointer: &str) -> Value {
    let mut parts = pointer.trim_start_matches('/').split('/');
    let Some(first) = parts.next() else {
        return Value::Null;
    };
    parts
        .fold(object.get(first), |current, part| current.and_then(|v| v.get(part)))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Id of a reference that is either a bare string or an object with `id`
pub(crate) fn ref_id(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        Value::Object(map) => map.get("id").cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Array elements at `key`, empty when absent or not an array
pub(crate) fn items<'a>(object: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Value> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .into_iter()
        .flatten()
}

pub(crate) fn row<const N: usize>(columns: [(&str, Value); N]) -> Row {
    columns
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Copy `columns` straight from the record
pub(crate) fn copy_fields(id: &str, object: &Map<String, Value>, columns: &[&str]) -> Row {
    let mut row: Row = columns
        .iter()
        .map(|name| (name.to_string(), get(object, name)))
        .collect();
    row.insert("id".to_string(), Value::String(id.to_string()));
    row
}

/// `<owner>_id` plus the listed keys of the record's `ids` object
pub(crate) fn ids_row(owner: &str, id: &str, object: &Map<String, Value>, keys: &[&str]) -> Row {
    let ids = object.get("ids").and_then(Value::as_object);
    let mut row: Row = keys
        .iter()
        .map(|key| {
            let value = ids.and_then(|m| m.get(*key)).cloned().unwrap_or(Value::Null);
            (key.to_string(), value)
        })
        .collect();
    row.insert(owner.to_string(), Value::String(id.to_string()));
    row
}

/// Rows of `counts_by_year` keyed by `<owner>` and `year`
pub(crate) fn counts_by_year(owner: &str, id: &str, object: &Map<String, Value>, metrics: &[&str]) -> Vec<Row> {
    items(object, "counts_by_year")
        .filter_map(Value::as_object)
        .filter(|entry| entry.get("year").is_some_and(|y| !y.is_null()))
        .map(|entry| {
            let mut row = Row::new();
            row.insert(owner.to_string(), Value::String(id.to_string()));
            row.insert("year".to_string(), get(entry, "year"));
            for metric in metrics {
                row.insert(metric.to_string(), get(entry, metric));
            }
            row
        })
        .collect()
}

/// Add `rows` under `table` unless empty
pub(crate) fn push_many(sets: &mut RowSets, table: &str, rows: Vec<Row>) {
    if !rows.is_empty() {
        sets.insert(table.to_string(), RowSet::Many(rows));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_without_id_is_skipped() {
        let result = OpenAlexNormalizer
            .normalize(EntityKind::Authors, &json!({"display_name": "Nobody"}))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_non_object_is_an_error() {
        assert!(OpenAlexNormalizer
            .normalize(EntityKind::Works, &json!([1, 2, 3]))
            .is_err());
    }

    #[test]
    fn test_at_follows_pointer() {
        let record = json!({"geo": {"city": "Lyon", "latitude": 45.76}});
        let object = record.as_object().unwrap();
        assert_eq!(at(object, "/geo/city"), json!("Lyon"));
        assert_eq!(at(object, "/geo/missing"), Value::Null);
        assert_eq!(at(object, "/nothing/here"), Value::Null);
    }

    #[test]
    fn test_ref_id_accepts_string_or_object() {
        assert_eq!(ref_id(&json!("https://openalex.org/P1")), json!("https://openalex.org/P1"));
        assert_eq!(ref_id(&json!({"id": "https://openalex.org/P2"})), json!("https://openalex.org/P2"));
        assert_eq!(ref_id(&json!(5)), Value::Null);
    }

    #[test]
    fn test_counts_by_year_skips_entries_without_year() {
        let record = json!({"counts_by_year": [
            {"year": 2023, "works_count": 4, "cited_by_count": 9},
            {"works_count": 1}
        ]});
        let rows = counts_by_year("author_id", "A1", record.as_object().unwrap(), &["works_count"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["year"], json!(2023));
        assert!(!rows[0].contains_key("cited_by_count"));
    }

    #[test]
    fn test_row_set_into_vec() {
        assert_eq!(RowSet::One(Row::new()).into_vec().len(), 1);
        assert!(RowSet::Many(Vec::new()).is_empty());
    }
}
