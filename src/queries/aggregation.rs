//! Aggregation pipelines: average price per genre, most prolific author, and
//! books grouped by publication decade.
//!
//! Each pipeline is checked by [`unknown_field_references`] before it is
//! sent. A `$group` that keys on a field the preceding `$project` never
//! produced does not fail server-side; every document lands in one `null`
//! bucket instead. The check logs such references so the collapse is visible.
use std::collections::BTreeSet;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use serde::de::DeserializeOwned;

use crate::db::Catalog;
use crate::model::{AuthorCount, DecadeGroup, GenreAverage};

pub fn average_price_by_genre_pipeline() -> Vec<Document> {
    vec![
        doc! { "$group": { "_id": "$genre", "averagePrice": { "$avg": "$price" } } },
        doc! { "$sort": { "averagePrice": 1 } },
    ]
}

pub fn top_author_pipeline() -> Vec<Document> {
    vec![
        doc! { "$group": { "_id": "$author", "bookCount": { "$sum": 1 } } },
        doc! { "$sort": { "bookCount": -1 } },
        doc! { "$limit": 1 },
    ]
}

pub fn books_by_decade_pipeline() -> Vec<Document> {
    vec![
        doc! {
            "$project": {
                "_id": 0,
                "title": 1,
                "published_year": 1,
                "decade": {
                    "$subtract": ["$published_year", { "$mod": ["$published_year", 10] }]
                },
            }
        },
        doc! {
            "$group": {
                "_id": "$decade",
                "count": { "$sum": 1 },
                "titles": { "$push": "$title" },
            }
        },
        doc! { "$sort": { "_id": 1 } },
    ]
}

/// Fields visible to the next stage, or `None` while the documents still have
/// the collection's own (unknown) shape.
type Visible = Option<BTreeSet<String>>;

/// Report `$group` and `$sort` references to fields that an earlier
/// `$project` or `$group` stage removed or never created.
pub fn unknown_field_references(pipeline: &[Document]) -> Vec<String> {
    let mut visible: Visible = None;
    let mut problems = Vec::new();

    for (position, stage) in pipeline.iter().enumerate() {
        let Some((operator, body)) = stage.iter().next() else {
            continue;
        };
        let Bson::Document(body) = body else {
            continue;
        };

        match operator.as_str() {
            "$project" => {
                let mut fields = BTreeSet::new();
                if !matches!(body.get("_id"), Some(value) if is_exclusion(value)) {
                    fields.insert("_id".to_string());
                }
                for (field, value) in body {
                    if field != "_id" && !is_exclusion(value) {
                        fields.insert(root_field(field).to_string());
                    }
                }
                visible = Some(fields);
            }
            "$group" => {
                if let Some(fields) = &visible {
                    let mut referenced = BTreeSet::new();
                    for value in body.values() {
                        collect_field_paths(value, &mut referenced);
                    }
                    for field in referenced.difference(fields) {
                        problems.push(format!(
                            "stage {position} ($group) references '${field}', which no earlier stage produces"
                        ));
                    }
                }
                visible = Some(body.keys().cloned().collect());
            }
            "$sort" => {
                if let Some(fields) = &visible {
                    for field in body.keys() {
                        if !fields.contains(root_field(field)) {
                            problems.push(format!(
                                "stage {position} ($sort) sorts on '{field}', which no earlier stage produces"
                            ));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    problems
}

fn is_exclusion(value: &Bson) -> bool {
    match value {
        Bson::Int32(0) | Bson::Int64(0) | Bson::Boolean(false) => true,
        Bson::Double(v) => *v == 0.0,
        _ => false,
    }
}

fn root_field(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// Collect the root segment of every `"$field.path"` reference inside an
/// expression. `$$` variables are skipped.
fn collect_field_paths(value: &Bson, out: &mut BTreeSet<String>) {
    match value {
        Bson::String(s) if s.starts_with('$') && !s.starts_with("$$") => {
            out.insert(root_field(&s[1..]).to_string());
        }
        Bson::Document(doc) => {
            for inner in doc.values() {
                collect_field_paths(inner, out);
            }
        }
        Bson::Array(items) => {
            for inner in items {
                collect_field_paths(inner, out);
            }
        }
        _ => {}
    }
}

async fn run_pipeline<T: DeserializeOwned>(
    catalog: &Catalog,
    name: &str,
    pipeline: Vec<Document>,
) -> Result<Vec<T>> {
    for problem in unknown_field_references(&pipeline) {
        tracing::warn!(pipeline = name, "{problem}");
    }

    let rows: Vec<Document> = catalog
        .documents()
        .aggregate(pipeline)
        .await
        .with_context(|| format!("Aggregation '{name}' failed"))?
        .try_collect()
        .await
        .with_context(|| format!("Failed to read results of aggregation '{name}'"))?;

    rows.into_iter()
        .map(|row| {
            bson::from_document(row)
                .with_context(|| format!("Unexpected row shape from aggregation '{name}'"))
        })
        .collect()
}

/// Mean price per genre, cheapest genre first
pub async fn average_price_by_genre(catalog: &Catalog) -> Result<Vec<GenreAverage>> {
    run_pipeline(catalog, "average_price_by_genre", average_price_by_genre_pipeline()).await
}

/// The author with the most books, or `None` for an empty collection
pub async fn top_author(catalog: &Catalog) -> Result<Option<AuthorCount>> {
    let rows: Vec<AuthorCount> = run_pipeline(catalog, "top_author", top_author_pipeline()).await?;
    Ok(rows.into_iter().next())
}

/// Books grouped by the decade they were published in, earliest decade first
pub async fn books_by_decade(catalog: &Catalog) -> Result<Vec<DecadeGroup>> {
    run_pipeline(catalog, "books_by_decade", books_by_decade_pipeline()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipped_pipelines_reference_only_produced_fields() {
        assert!(unknown_field_references(&average_price_by_genre_pipeline()).is_empty());
        assert!(unknown_field_references(&top_author_pipeline()).is_empty());
        assert!(unknown_field_references(&books_by_decade_pipeline()).is_empty());
    }

    #[test]
    fn test_misspelled_group_key_is_reported() {
        let mut pipeline = books_by_decade_pipeline();
        pipeline[1] = doc! {
            "$group": {
                "_id": "$dacade",
                "count": { "$sum": 1 },
                "titles": { "$push": "$title" },
            }
        };

        let problems = unknown_field_references(&pipeline);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("$dacade"), "{problems:?}");
        assert!(problems[0].contains("$group"));
    }

    #[test]
    fn test_sort_on_dropped_field_is_reported() {
        let pipeline = vec![
            doc! { "$group": { "_id": "$genre", "averagePrice": { "$avg": "$price" } } },
            doc! { "$sort": { "price": 1 } },
        ];

        let problems = unknown_field_references(&pipeline);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("'price'"));
    }

    #[test]
    fn test_excluded_id_is_not_visible_after_project() {
        let pipeline = vec![
            doc! { "$project": { "_id": 0, "title": 1 } },
            doc! { "$group": { "_id": "$_id", "n": { "$sum": 1 } } },
        ];

        let problems = unknown_field_references(&pipeline);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("'$_id'"));
    }

    #[test]
    fn test_variables_and_literals_are_ignored() {
        let pipeline = vec![
            doc! { "$project": { "title": 1 } },
            doc! { "$group": { "_id": null, "all": { "$push": "$$ROOT" }, "n": { "$sum": 1 } } },
        ];

        assert!(unknown_field_references(&pipeline).is_empty());
    }

    #[test]
    fn test_decade_expression_truncates_to_multiple_of_ten() {
        let pipeline = books_by_decade_pipeline();
        let project = pipeline[0].get_document("$project").unwrap();
        let decade = project.get_document("decade").unwrap();
        let operands = decade.get_array("$subtract").unwrap();
        assert_eq!(operands[0], Bson::String("$published_year".to_string()));
        assert_eq!(
            operands[1],
            Bson::Document(doc! { "$mod": ["$published_year", 10] })
        );
    }

    #[test]
    fn test_top_author_keeps_single_largest_group() {
        let pipeline = top_author_pipeline();
        assert_eq!(pipeline[1], doc! { "$sort": { "bookCount": -1 } });
        assert_eq!(pipeline[2], doc! { "$limit": 1 });
    }
}
