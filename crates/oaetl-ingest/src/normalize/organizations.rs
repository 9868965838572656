//! Publishers, institutions and sources

use super::{at, copy_fields, counts_by_year, get, ids_row, items, push_many, ref_id, row, RowSet, RowSets};
use serde_json::{Map, Value};

pub(super) fn publisher(id: &str, object: &Map<String, Value>) -> RowSets {
    let mut main = copy_fields(
        id,
        object,
        &[
            "display_name",
            "alternate_titles",
            "country_codes",
            "hierarchy_level",
            "works_count",
            "cited_by_count",
            "sources_api_url",
            "updated_date",
        ],
    );
    main.insert("parent_publisher".into(), ref_id(&get(object, "parent_publisher")));

    let mut sets = RowSets::new();
    sets.insert("publishers".into(), RowSet::One(main));
    sets.insert(
        "publishers_ids".into(),
        RowSet::One(ids_row("publisher_id", id, object, &["openalex", "ror", "wikidata"])),
    );
    push_many(
        &mut sets,
        "publishers_counts_by_year",
        counts_by_year("publisher_id", id, object, &["works_count", "cited_by_count"]),
    );
    sets
}

pub(super) fn institution(id: &str, object: &Map<String, Value>) -> RowSets {
    let main = copy_fields(
        id,
        object,
        &[
            "ror",
            "display_name",
            "country_code",
            "type",
            "homepage_url",
            "image_url",
            "image_thumbnail_url",
            "display_name_acronyms",
            "display_name_alternatives",
            "works_count",
            "cited_by_count",
            "works_api_url",
            "updated_date",
        ],
    );

    let mut sets = RowSets::new();
    sets.insert("institutions".into(), RowSet::One(main));
    sets.insert(
        "institutions_ids".into(),
        RowSet::One(ids_row(
            "institution_id",
            id,
            object,
            &["openalex", "ror", "grid", "wikipedia", "wikidata", "mag"],
        )),
    );

    if object.get("geo").is_some_and(Value::is_object) {
        sets.insert(
            "institutions_geo".into(),
            RowSet::One(row([
                ("institution_id", Value::String(id.to_string())),
                ("city", at(object, "/geo/city")),
                ("geonames_city_id", at(object, "/geo/geonames_city_id")),
                ("region", at(object, "/geo/region")),
                ("country_code", at(object, "/geo/country_code")),
                ("country", at(object, "/geo/country")),
                ("latitude", at(object, "/geo/latitude")),
                ("longitude", at(object, "/geo/longitude")),
            ])),
        );
    }

    let associated = items(object, "associated_institutions")
        .filter_map(Value::as_object)
        .filter_map(|assoc| {
            let other = ref_id(&get(assoc, "id"));
            (!other.is_null()).then(|| {
                row([
                    ("institution_id", Value::String(id.to_string())),
                    ("associated_institution_id", other),
                    ("relationship", get(assoc, "relationship")),
                ])
            })
        })
        .collect();
    push_many(&mut sets, "institutions_associated_institutions", associated);
    push_many(
        &mut sets,
        "institutions_counts_by_year",
        counts_by_year("institution_id", id, object, &["works_count", "cited_by_count"]),
    );
    sets
}

pub(super) fn source(id: &str, object: &Map<String, Value>) -> RowSets {
    let mut main = copy_fields(
        id,
        object,
        &[
            "issn_l",
            "issn",
            "display_name",
            "type",
            "is_oa",
            "is_in_doaj",
            "homepage_url",
            "works_count",
            "cited_by_count",
            "works_api_url",
            "updated_date",
        ],
    );
    // Older snapshots carry `publisher`, newer ones `host_organization_name`.
    let publisher = match get(object, "host_organization_name") {
        Value::Null => get(object, "publisher"),
        name => name,
    };
    main.insert("publisher".into(), publisher);

    let mut sets = RowSets::new();
    sets.insert("sources".into(), RowSet::One(main));
    sets.insert(
        "sources_ids".into(),
        RowSet::One(ids_row(
            "source_id",
            id,
            object,
            &["openalex", "issn_l", "issn", "mag", "wikidata", "fatcat"],
        )),
    );
    push_many(
        &mut sets,
        "sources_counts_by_year",
        counts_by_year("source_id", id, object, &["works_count", "cited_by_count"]),
    );
    sets
}
