//! Table definitions per entity kind

use super::{Column, ColumnType::*, TableRole, TableSpec};
use crate::entity::EntityKind;

macro_rules! col {
    ($name:literal, $ty:ident) => {
        Column { name: $name, ty: $ty }
    };
}

const fn primary(entity: EntityKind, columns: &'static [Column]) -> TableSpec {
    TableSpec {
        entity,
        name: entity.as_str(),
        role: TableRole::Primary { id: "id" },
        columns,
    }
}

const fn one_to_one(entity: EntityKind, name: &'static str, owner: &'static str, columns: &'static [Column]) -> TableSpec {
    TableSpec {
        entity,
        name,
        role: TableRole::OneToOne { owner },
        columns,
    }
}

const fn association(
    entity: EntityKind,
    name: &'static str,
    key: &'static [&'static str],
    columns: &'static [Column],
) -> TableSpec {
    TableSpec {
        entity,
        name,
        role: TableRole::Association { key },
        columns,
    }
}

// ============================================================================
// Topic taxonomy
// ============================================================================

static DOMAINS: [TableSpec; 1] = [primary(
    EntityKind::Domains,
    &[
        col!("id", Text),
        col!("display_name", Text),
        col!("description", Text),
        col!("display_name_alternatives", Jsonb),
        col!("works_count", BigInt),
        col!("cited_by_count", BigInt),
        col!("updated_date", Timestamp),
    ],
)];

static FIELDS: [TableSpec; 1] = [primary(
    EntityKind::Fields,
    &[
        col!("id", Text),
        col!("display_name", Text),
        col!("description", Text),
        col!("domain_id", Text),
        col!("works_count", BigInt),
        col!("cited_by_count", BigInt),
        col!("updated_date", Timestamp),
    ],
)];

static SUBFIELDS: [TableSpec; 1] = [primary(
    EntityKind::Subfields,
    &[
        col!("id", Text),
        col!("display_name", Text),
        col!("description", Text),
        col!("field_id", Text),
        col!("domain_id", Text),
        col!("works_count", BigInt),
        col!("cited_by_count", BigInt),
        col!("updated_date", Timestamp),
    ],
)];

static TOPICS: [TableSpec; 1] = [primary(
    EntityKind::Topics,
    &[
        col!("id", Text),
        col!("display_name", Text),
        col!("description", Text),
        col!("keywords", Jsonb),
        col!("subfield_id", Text),
        col!("field_id", Text),
        col!("domain_id", Text),
        col!("works_count", BigInt),
        col!("cited_by_count", BigInt),
        col!("updated_date", Timestamp),
    ],
)];

// ============================================================================
// Organisations
// ============================================================================

static PUBLISHERS: [TableSpec; 3] = [
    primary(
        EntityKind::Publishers,
        &[
            col!("id", Text),
            col!("display_name", Text),
            col!("alternate_titles", Jsonb),
            col!("country_codes", Jsonb),
            col!("hierarchy_level", Integer),
            col!("parent_publisher", Text),
            col!("works_count", BigInt),
            col!("cited_by_count", BigInt),
            col!("sources_api_url", Text),
            col!("updated_date", Timestamp),
        ],
    ),
    one_to_one(
        EntityKind::Publishers,
        "publishers_ids",
        "publisher_id",
        &[
            col!("publisher_id", Text),
            col!("openalex", Text),
            col!("ror", Text),
            col!("wikidata", Text),
        ],
    ),
    association(
        EntityKind::Publishers,
        "publishers_counts_by_year",
        &["publisher_id", "year"],
        &[
            col!("publisher_id", Text),
            col!("year", Integer),
            col!("works_count", BigInt),
            col!("cited_by_count", BigInt),
        ],
    ),
];

static INSTITUTIONS: [TableSpec; 5] = [
    primary(
        EntityKind::Institutions,
        &[
            col!("id", Text),
            col!("ror", Text),
            col!("display_name", Text),
            col!("country_code", Text),
            col!("type", Text),
            col!("homepage_url", Text),
            col!("image_url", Text),
            col!("image_thumbnail_url", Text),
            col!("display_name_acronyms", Jsonb),
            col!("display_name_alternatives", Jsonb),
            col!("works_count", BigInt),
            col!("cited_by_count", BigInt),
            col!("works_api_url", Text),
            col!("updated_date", Timestamp),
        ],
    ),
    one_to_one(
        EntityKind::Institutions,
        "institutions_ids",
        "institution_id",
        &[
            col!("institution_id", Text),
            col!("openalex", Text),
            col!("ror", Text),
            col!("grid", Text),
            col!("wikipedia", Text),
            col!("wikidata", Text),
            col!("mag", BigInt),
        ],
    ),
    one_to_one(
        EntityKind::Institutions,
        "institutions_geo",
        "institution_id",
        &[
            col!("institution_id", Text),
            col!("city", Text),
            col!("geonames_city_id", Text),
            col!("region", Text),
            col!("country_code", Text),
            col!("country", Text),
            col!("latitude", Double),
            col!("longitude", Double),
        ],
    ),
    association(
        EntityKind::Institutions,
        "institutions_associated_institutions",
        &["institution_id", "associated_institution_id"],
        &[
            col!("institution_id", Text),
            col!("associated_institution_id", Text),
            col!("relationship", Text),
        ],
    ),
    association(
        EntityKind::Institutions,
        "institutions_counts_by_year",
        &["institution_id", "year"],
        &[
            col!("institution_id", Text),
            col!("year", Integer),
            col!("works_count", BigInt),
            col!("cited_by_count", BigInt),
        ],
    ),
];

static SOURCES: [TableSpec; 3] = [
    primary(
        EntityKind::Sources,
        &[
            col!("id", Text),
            col!("issn_l", Text),
            col!("issn", Jsonb),
            col!("display_name", Text),
            col!("publisher", Text),
            col!("type", Text),
            col!("is_oa", Boolean),
            col!("is_in_doaj", Boolean),
            col!("homepage_url", Text),
            col!("works_count", BigInt),
            col!("cited_by_count", BigInt),
            col!("works_api_url", Text),
            col!("updated_date", Timestamp),
        ],
    ),
    one_to_one(
        EntityKind::Sources,
        "sources_ids",
        "source_id",
        &[
            col!("source_id", Text),
            col!("openalex", Text),
            col!("issn_l", Text),
            col!("issn", Jsonb),
            col!("mag", BigInt),
            col!("wikidata", Text),
            col!("fatcat", Text),
        ],
    ),
    association(
        EntityKind::Sources,
        "sources_counts_by_year",
        &["source_id", "year"],
        &[
            col!("source_id", Text),
            col!("year", Integer),
            col!("works_count", BigInt),
            col!("cited_by_count", BigInt),
        ],
    ),
];

// ============================================================================
// Authors and works
// ============================================================================

static AUTHORS: [TableSpec; 3] = [
    primary(
        EntityKind::Authors,
        &[
            col!("id", Text),
            col!("orcid", Text),
            col!("display_name", Text),
            col!("display_name_alternatives", Jsonb),
            col!("works_count", BigInt),
            col!("cited_by_count", BigInt),
            col!("last_known_institution", Text),
            col!("works_api_url", Text),
            col!("updated_date", Timestamp),
        ],
    ),
    one_to_one(
        EntityKind::Authors,
        "authors_ids",
        "author_id",
        &[
            col!("author_id", Text),
            col!("openalex", Text),
            col!("orcid", Text),
            col!("scopus", Text),
            col!("twitter", Text),
            col!("wikipedia", Text),
            col!("mag", BigInt),
        ],
    ),
    association(
        EntityKind::Authors,
        "authors_counts_by_year",
        &["author_id", "year"],
        &[
            col!("author_id", Text),
            col!("year", Integer),
            col!("works_count", BigInt),
            col!("cited_by_count", BigInt),
        ],
    ),
];

static WORKS: [TableSpec; 10] = [
    primary(
        EntityKind::Works,
        &[
            col!("id", Text),
            col!("doi", Text),
            col!("title", Text),
            col!("display_name", Text),
            col!("publication_year", Integer),
            col!("publication_date", Date),
            col!("type", Text),
            col!("language", Text),
            col!("cited_by_count", BigInt),
            col!("is_retracted", Boolean),
            col!("is_paratext", Boolean),
            col!("cited_by_api_url", Text),
            col!("abstract_inverted_index", Jsonb),
            col!("updated_date", Timestamp),
        ],
    ),
    one_to_one(
        EntityKind::Works,
        "works_ids",
        "work_id",
        &[
            col!("work_id", Text),
            col!("openalex", Text),
            col!("doi", Text),
            col!("mag", BigInt),
            col!("pmid", Text),
            col!("pmcid", Text),
        ],
    ),
    one_to_one(
        EntityKind::Works,
        "works_primary_locations",
        "work_id",
        &[
            col!("work_id", Text),
            col!("source_id", Text),
            col!("landing_page_url", Text),
            col!("pdf_url", Text),
            col!("is_oa", Boolean),
            col!("version", Text),
            col!("license", Text),
        ],
    ),
    one_to_one(
        EntityKind::Works,
        "works_open_access",
        "work_id",
        &[
            col!("work_id", Text),
            col!("is_oa", Boolean),
            col!("oa_status", Text),
            col!("oa_url", Text),
            col!("any_repository_has_fulltext", Boolean),
        ],
    ),
    // Key parts are never NULL; the normalizer stores missing ones as ''
    association(
        EntityKind::Works,
        "works_locations",
        &["work_id", "source_id", "landing_page_url", "pdf_url"],
        &[
            col!("work_id", Text),
            col!("source_id", Text),
            col!("landing_page_url", Text),
            col!("pdf_url", Text),
            col!("is_oa", Boolean),
            col!("version", Text),
            col!("license", Text),
        ],
    ),
    association(
        EntityKind::Works,
        "works_authorships",
        &["work_id", "author_id"],
        &[
            col!("work_id", Text),
            col!("author_id", Text),
            col!("author_position", Text),
            col!("institution_ids", Jsonb),
            col!("raw_affiliation_string", Text),
        ],
    ),
    association(
        EntityKind::Works,
        "works_topics",
        &["work_id", "topic_id"],
        &[col!("work_id", Text), col!("topic_id", Text), col!("score", Double)],
    ),
    association(
        EntityKind::Works,
        "works_referenced_works",
        &["work_id", "referenced_work_id"],
        &[col!("work_id", Text), col!("referenced_work_id", Text)],
    ),
    association(
        EntityKind::Works,
        "works_related_works",
        &["work_id", "related_work_id"],
        &[col!("work_id", Text), col!("related_work_id", Text)],
    ),
    association(
        EntityKind::Works,
        "works_counts_by_year",
        &["work_id", "year"],
        &[col!("work_id", Text), col!("year", Integer), col!("cited_by_count", BigInt)],
    ),
];

/// Every table of `kind`, primary table first
pub fn tables_for(kind: EntityKind) -> &'static [TableSpec] {
    match kind {
        EntityKind::Domains => &DOMAINS,
        EntityKind::Fields => &FIELDS,
        EntityKind::Subfields => &SUBFIELDS,
        EntityKind::Topics => &TOPICS,
        EntityKind::Publishers => &PUBLISHERS,
        EntityKind::Institutions => &INSTITUTIONS,
        EntityKind::Sources => &SOURCES,
        EntityKind::Authors => &AUTHORS,
        EntityKind::Works => &WORKS,
    }
}

pub fn primary_table(kind: EntityKind) -> &'static TableSpec {
    // Each list starts with its primary table.
    &tables_for(kind)[0]
}

/// Look up a table of `kind` by name; tables of other kinds are not visible
pub fn table_for(kind: EntityKind, name: &str) -> Option<&'static TableSpec> {
    tables_for(kind).iter().find(|t| t.name == name)
}
