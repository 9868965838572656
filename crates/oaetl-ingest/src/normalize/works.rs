//! Works and their edges

use super::{at, copy_fields, get, ids_row, items, push_many, ref_id, row, Row, RowSet, RowSets};
use serde_json::{Map, Value};

const LOCATION_FIELDS: [&str; 5] = ["landing_page_url", "pdf_url", "is_oa", "version", "license"];

/// Key columns of `works_locations` besides `work_id`; missing parts are
/// stored as empty strings so the key is never NULL
const LOCATION_KEY: [&str; 3] = ["source_id", "landing_page_url", "pdf_url"];

pub(super) fn work(id: &str, object: &Map<String, Value>) -> RowSets {
    let main = copy_fields(
        id,
        object,
        &[
            "doi",
            "title",
            "display_name",
            "publication_year",
            "publication_date",
            "type",
            "language",
            "cited_by_count",
            "is_retracted",
            "is_paratext",
            "cited_by_api_url",
            "abstract_inverted_index",
            "updated_date",
        ],
    );
    let owner = || Value::String(id.to_string());

    let mut sets = RowSets::new();
    sets.insert("works".into(), RowSet::One(main));
    sets.insert(
        "works_ids".into(),
        RowSet::One(ids_row("work_id", id, object, &["openalex", "doi", "mag", "pmid", "pmcid"])),
    );

    if let Some(primary) = object.get("primary_location").and_then(Value::as_object) {
        sets.insert("works_primary_locations".into(), RowSet::One(location_row(id, primary)));
    }

    let locations = items(object, "locations")
        .filter_map(Value::as_object)
        .map(|location| {
            let mut out = location_row(id, location);
            for name in LOCATION_KEY {
                if let Some(value) = out.get_mut(name).filter(|v| v.is_null()) {
                    *value = Value::String(String::new());
                }
            }
            out
        })
        .collect();
    push_many(&mut sets, "works_locations", locations);

    if object.get("open_access").is_some_and(Value::is_object) {
        sets.insert(
            "works_open_access".into(),
            RowSet::One(row([
                ("work_id", owner()),
                ("is_oa", at(object, "/open_access/is_oa")),
                ("oa_status", at(object, "/open_access/oa_status")),
                ("oa_url", at(object, "/open_access/oa_url")),
                (
                    "any_repository_has_fulltext",
                    at(object, "/open_access/any_repository_has_fulltext"),
                ),
            ])),
        );
    }

    let authorships = items(object, "authorships")
        .filter_map(Value::as_object)
        .filter_map(|authorship| {
            let author_id = at(authorship, "/author/id");
            if author_id.is_null() {
                return None;
            }
            let institution_ids: Vec<Value> = items(authorship, "institutions")
                .map(ref_id)
                .filter(|id| !id.is_null())
                .collect();
            let affiliation = match get(authorship, "raw_affiliation_string") {
                Value::Null => items(authorship, "raw_affiliation_strings")
                    .next()
                    .cloned()
                    .unwrap_or(Value::Null),
                raw => raw,
            };
            Some(row([
                ("work_id", owner()),
                ("author_id", author_id),
                ("author_position", get(authorship, "author_position")),
                ("institution_ids", Value::Array(institution_ids)),
                ("raw_affiliation_string", affiliation),
            ]))
        })
        .collect();
    push_many(&mut sets, "works_authorships", authorships);

    let topics = items(object, "topics")
        .filter_map(Value::as_object)
        .filter_map(|topic| {
            let topic_id = get(topic, "id");
            (!topic_id.is_null()).then(|| {
                row([
                    ("work_id", owner()),
                    ("topic_id", topic_id),
                    ("score", get(topic, "score")),
                ])
            })
        })
        .collect();
    push_many(&mut sets, "works_topics", topics);

    push_many(
        &mut sets,
        "works_referenced_works",
        edges(id, object, "referenced_works", "referenced_work_id"),
    );
    push_many(
        &mut sets,
        "works_related_works",
        edges(id, object, "related_works", "related_work_id"),
    );

    let counts = items(object, "counts_by_year")
        .filter_map(Value::as_object)
        .filter(|entry| entry.get("year").is_some_and(|y| !y.is_null()))
        .map(|entry| {
            row([
                ("work_id", owner()),
                ("year", get(entry, "year")),
                ("cited_by_count", get(entry, "cited_by_count")),
            ])
        })
        .collect();
    push_many(&mut sets, "works_counts_by_year", counts);

    sets
}

fn location_row(id: &str, location: &Map<String, Value>) -> Row {
    let mut out: Row = LOCATION_FIELDS
        .iter()
        .map(|name| (name.to_string(), get(location, name)))
        .collect();
    out.insert("work_id".into(), Value::String(id.to_string()));
    out.insert("source_id".into(), at(location, "/source/id"));
    out
}

/// One row per string id in the array at `key`
fn edges(id: &str, object: &Map<String, Value>, key: &str, target: &str) -> Vec<Row> {
    items(object, key)
        .filter(|v| v.is_string())
        .map(|other| {
            let mut edge = Row::new();
            edge.insert("work_id".into(), Value::String(id.to_string()));
            edge.insert(target.to_string(), other.clone());
            edge
        })
        .collect()
}
