//! Index creation and query plan inspection.
use anyhow::{Context, Result, anyhow};
use mongodb::IndexModel;
use mongodb::bson::{Bson, Document, doc};

use super::basic::{author_filter, title_filter};
use crate::db::Catalog;

/// What the server reported about how it executed an explained query
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSummary {
    /// Stage at the root of the winning plan, e.g. `FETCH`
    pub winning_stage: String,
    /// Stage feeding the root, e.g. `IXSCAN`, when the plan has one
    pub input_stage: Option<String>,
    pub docs_examined: u64,
    pub keys_examined: u64,
}

impl PlanSummary {
    /// Extract the summary from an `explain` response run with
    /// `executionStats` verbosity.
    pub fn from_explain(response: &Document) -> Result<Self> {
        let planner = response
            .get_document("queryPlanner")
            .context("explain response has no queryPlanner")?;
        let mut plan = planner
            .get_document("winningPlan")
            .context("explain response has no winningPlan")?;
        // The slot-based engine nests the classic plan one level deeper.
        if let Ok(inner) = plan.get_document("queryPlan") {
            plan = inner;
        }

        let winning_stage = plan
            .get_str("stage")
            .context("winning plan has no stage")?
            .to_string();
        let input_stage = plan
            .get_document("inputStage")
            .ok()
            .and_then(|input| input.get_str("stage").ok())
            .map(str::to_string);

        let stats = response
            .get_document("executionStats")
            .context("explain response has no executionStats")?;

        Ok(Self {
            winning_stage,
            input_stage,
            docs_examined: counter(stats, "totalDocsExamined")?,
            keys_examined: counter(stats, "totalKeysExamined")?,
        })
    }

    /// The stage doing the actual lookup: the input stage when present,
    /// otherwise the root.
    pub fn effective_stage(&self) -> &str {
        self.input_stage.as_deref().unwrap_or(&self.winning_stage)
    }
}

fn counter(stats: &Document, key: &str) -> Result<u64> {
    match stats.get(key) {
        Some(Bson::Int32(n)) => u64::try_from(*n).map_err(|_| anyhow!("{key} is negative: {n}")),
        Some(Bson::Int64(n)) => u64::try_from(*n).map_err(|_| anyhow!("{key} is negative: {n}")),
        Some(Bson::Double(n)) if *n >= 0.0 => Ok(*n as u64),
        Some(other) => Err(anyhow!("{key} has unexpected value {other}")),
        None => Err(anyhow!("executionStats has no {key}")),
    }
}

pub fn title_index() -> IndexModel {
    IndexModel::builder().keys(doc! { "title": 1 }).build()
}

pub fn author_year_index() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "author": 1, "published_year": -1 })
        .build()
}

/// Build an `explain` command for a find on `collection`
pub fn explain_find_command(collection: &str, filter: Document, sort: Option<Document>) -> Document {
    let mut find = doc! { "find": collection, "filter": filter };
    if let Some(sort) = sort {
        find.insert("sort", sort);
    }
    doc! { "explain": find, "verbosity": "executionStats" }
}

pub fn author_since_filter(author: &str, year: i32) -> Document {
    let mut filter = author_filter(author);
    filter.insert("published_year", doc! { "$gt": year });
    filter
}

/// Create the title index and the compound author/year index.
///
/// Creating an index that already exists with the same keys is a no-op on the
/// server, so this can run on every invocation. Returns the index names.
pub async fn create_indexes(catalog: &Catalog) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(2);
    for model in [title_index(), author_year_index()] {
        let keys = model.keys.clone();
        let created = catalog
            .books()
            .create_index(model)
            .await
            .with_context(|| format!("Failed to create index {keys}"))?;
        tracing::debug!(index = created.index_name.as_str(), "index ready");
        names.push(created.index_name);
    }
    Ok(names)
}

async fn explain(catalog: &Catalog, command: Document) -> Result<PlanSummary> {
    let response = catalog.run_command(command).await?;
    PlanSummary::from_explain(&response)
}

/// Explain a lookup by exact title
pub async fn explain_title_lookup(catalog: &Catalog, title: &str) -> Result<PlanSummary> {
    let command = explain_find_command(catalog.collection_name(), title_filter(title), None);
    explain(catalog, command).await
}

/// Explain an author plus year-range find sorted by year descending
pub async fn explain_author_since(
    catalog: &Catalog,
    author: &str,
    year: i32,
) -> Result<PlanSummary> {
    let command = explain_find_command(
        catalog.collection_name(),
        author_since_filter(author, year),
        Some(doc! { "published_year": -1 }),
    );
    explain(catalog, command).await
}
