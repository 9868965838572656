//! Authors

use super::{copy_fields, counts_by_year, get, ids_row, items, push_many, ref_id, RowSet, RowSets};
use serde_json::{Map, Value};

pub(super) fn author(id: &str, object: &Map<String, Value>) -> RowSets {
    let mut main = copy_fields(
        id,
        object,
        &[
            "orcid",
            "display_name",
            "display_name_alternatives",
            "works_count",
            "cited_by_count",
            "works_api_url",
            "updated_date",
        ],
    );
    main.insert("last_known_institution".into(), last_known_institution(object));

    let mut sets = RowSets::new();
    sets.insert("authors".into(), RowSet::One(main));
    sets.insert(
        "authors_ids".into(),
        RowSet::One(ids_row(
            "author_id",
            id,
            object,
            &["openalex", "orcid", "scopus", "twitter", "wikipedia", "mag"],
        )),
    );
    push_many(
        &mut sets,
        "authors_counts_by_year",
        counts_by_year("author_id", id, object, &["works_count", "cited_by_count"]),
    );
    sets
}

/// `last_known_institution` was replaced by a `last_known_institutions` list
fn last_known_institution(object: &Map<String, Value>) -> Value {
    match ref_id(&get(object, "last_known_institution")) {
        Value::Null => items(object, "last_known_institutions")
            .map(ref_id)
            .find(|id| !id.is_null())
            .unwrap_or(Value::Null),
        id => id,
    }
}
