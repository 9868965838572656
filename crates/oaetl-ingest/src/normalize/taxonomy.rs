//! Domains, fields, subfields and topics

use super::{at, copy_fields, Row, RowSet, RowSets};
use serde_json::{Map, Value};

const COMMON: [&str; 5] = [
    "display_name",
    "description",
    "works_count",
    "cited_by_count",
    "updated_date",
];

fn base(id: &str, object: &Map<String, Value>, extra: &[&str]) -> Row {
    let columns: Vec<&str> = COMMON.iter().chain(extra).copied().collect();
    copy_fields(id, object, &columns)
}

fn single(table: &str, row: Row) -> RowSets {
    RowSets::from([(table.to_string(), RowSet::One(row))])
}

pub(super) fn domain(id: &str, object: &Map<String, Value>) -> RowSets {
    single("domains", base(id, object, &["display_name_alternatives"]))
}

pub(super) fn field(id: &str, object: &Map<String, Value>) -> RowSets {
    let mut row = base(id, object, &[]);
    row.insert("domain_id".into(), at(object, "/domain/id"));
    single("fields", row)
}

pub(super) fn subfield(id: &str, object: &Map<String, Value>) -> RowSets {
    let mut row = base(id, object, &[]);
    row.insert("field_id".into(), at(object, "/field/id"));
    row.insert("domain_id".into(), at(object, "/domain/id"));
    single("subfields", row)
}

pub(super) fn topic(id: &str, object: &Map<String, Value>) -> RowSets {
    let mut row = base(id, object, &["keywords"]);
    row.insert("subfield_id".into(), at(object, "/subfield/id"));
    row.insert("field_id".into(), at(object, "/field/id"));
    row.insert("domain_id".into(), at(object, "/domain/id"));
    single("topics", row)
}
