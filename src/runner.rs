//! High-level runner API for the bookstore query sequence.
//!
//! This module hides the client lifecycle and the individual query modules
//! behind a single entry point. It is the primary API for the CLI and for the
//! integration tests.

use anyhow::Result;
use mongodb::bson::Document;
use std::time::{Duration, Instant};

use crate::config::{
    FEATURED_AUTHOR, FICTION_GENRE, INDEXED_AUTHOR, IN_STOCK_AFTER_YEAR, NEW_PRICE, PAGE_SIZE,
    RECENT_YEAR, REMOVED_TITLE, REPRICED_TITLE, TITLE_LOOKUP,
};
use crate::db::{Catalog, ConnectArgsBuilder, connect};
use crate::queries::{SortOrder, advanced, aggregation, basic, indexing};
use crate::telemetry::{RunStats, StepEvent};

pub use crate::config::{APP_NAME, COLLECTION_NAME, DATABASE_NAME, DEFAULT_URI};

/// Arguments for running the query sequence
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub uri: String,
    pub database: String,
    pub collection: String,
    /// Name the session reports to the server in its handshake
    pub app_name: String,
}

/// Result of a completed query sequence
#[derive(Debug)]
pub struct RunSummary {
    pub database: String,
    pub collection: String,
    pub steps_completed: usize,
    pub documents_returned: u64,
    pub books_modified: u64,
    pub books_deleted: u64,
    pub pages: usize,
    pub indexes: Vec<String>,
    pub duration: Duration,
    /// Time spent waiting on the steps themselves, excluding connect and close
    pub query_time: Duration,
    pub slowest_step: Option<(&'static str, Duration)>,
}

/// Counters raised by the write and index steps, folded into [`RunSummary`]
#[derive(Debug, Default)]
struct SequenceOutcome {
    books_modified: u64,
    books_deleted: u64,
    pages: usize,
    indexes: Vec<String>,
}

/// One in-flight step, timed from `start` to `finish`
struct Step {
    name: &'static str,
    started: Instant,
}

impl Step {
    fn start(stats: &mut RunStats, name: &'static str) -> Self {
        stats.update(&StepEvent::Started { step: name });
        Self {
            name,
            started: Instant::now(),
        }
    }

    fn finish(self, stats: &mut RunStats, documents: usize) {
        stats.update(&StepEvent::Finished {
            step: self.name,
            documents: documents as u64,
            duration: self.started.elapsed(),
        });
    }
}

/// Run the full query sequence against `args.collection`
///
/// Connects, executes every step strictly in order, and closes the connection
/// whether or not a step failed. The first failing step aborts the rest of
/// the sequence; writes already applied are not rolled back. The error is
/// logged here, once, and then returned for the caller to act on.
///
/// # Example
///
/// ```no_run
/// use bookstore_queries::runner::{RunArgs, run_queries};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = RunArgs {
///     uri: "mongodb://localhost:27017".to_string(),
///     database: "plp_bookstore".to_string(),
///     collection: "books".to_string(),
///     app_name: "bookstore-queries".to_string(),
/// };
///
/// let summary = run_queries(args).await?;
/// println!("Ran {} steps in {:?}", summary.steps_completed, summary.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_queries(args: RunArgs) -> Result<RunSummary> {
    let started = Instant::now();
    let connect_args = ConnectArgsBuilder::default()
        .uri(args.uri)
        .database(args.database)
        .collection(args.collection)
        .app_name(args.app_name)
        .build()?;

    let catalog = match connect(connect_args).await {
        Ok(catalog) => catalog,
        Err(err) => {
            tracing::error!("Error occurred: {err:#}");
            return Err(err);
        }
    };
    println!("Connected to MongoDB server for queries");
    println!(
        "Database '{}' and Collection '{}' initialized",
        catalog.database_name(),
        catalog.collection_name()
    );

    let database = catalog.database_name().to_string();
    let collection = catalog.collection_name().to_string();

    let mut stats = RunStats::new();
    let outcome = run_sequence(&catalog, &mut stats).await;

    catalog.close().await;
    println!("Connection closed");

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(
                step = stats.failed_step().unwrap_or("<none>"),
                steps_completed = stats.steps_completed,
                "Error occurred: {err:#}"
            );
            return Err(err);
        }
    };

    Ok(RunSummary {
        database,
        collection,
        steps_completed: stats.steps_completed,
        documents_returned: stats.documents_returned,
        books_modified: outcome.books_modified,
        books_deleted: outcome.books_deleted,
        pages: outcome.pages,
        indexes: outcome.indexes,
        duration: started.elapsed(),
        query_time: stats.total_duration,
        slowest_step: stats.slowest,
    })
}

fn print_documents(docs: &[Document]) {
    if docs.is_empty() {
        println!("  (none)");
    }
    for doc in docs {
        println!("  {doc}");
    }
}

fn print_plan(summary: &indexing::PlanSummary) {
    match &summary.input_stage {
        Some(input) => println!(
            "Query Plan stage: {input} (under {})",
            summary.winning_stage
        ),
        None => println!("Query Plan stage: {}", summary.winning_stage),
    }
    println!("Docs Examined: {}", summary.docs_examined);
    println!("Keys Examined: {}", summary.keys_examined);
}

async fn run_sequence(catalog: &Catalog, stats: &mut RunStats) -> Result<SequenceOutcome> {
    let mut outcome = SequenceOutcome::default();

    // ============ Basic operations ============
    println!();
    println!("---- Basic Operations on Books Collection ----");

    println!();
    println!("---- Query 1: Find all books in a specific genre ----");
    println!("Books in the genre \"{FICTION_GENRE}\":");
    let step = Step::start(stats, "books_in_genre");
    let titles = basic::books_in_genre(catalog, FICTION_GENRE).await?;
    step.finish(stats, titles.len());
    println!("{titles:?}");

    println!();
    println!("---- Query 2: Find books published after a specific year ----");
    println!("Books published after {RECENT_YEAR}:");
    let step = Step::start(stats, "books_published_after");
    let recent = basic::books_published_after(catalog, RECENT_YEAR).await?;
    step.finish(stats, recent.len());
    let recent: Vec<String> = recent.iter().map(|listing| listing.label()).collect();
    println!("{recent:?}");

    println!();
    println!("---- Query 3: Find books by a specific author ----");
    println!("Books by {FEATURED_AUTHOR}:");
    let step = Step::start(stats, "books_by_author");
    let by_author = basic::books_by_author(catalog, FEATURED_AUTHOR).await?;
    step.finish(stats, by_author.len());
    let by_author: Vec<String> = by_author.iter().map(|listing| listing.label()).collect();
    println!("{by_author:?}");

    println!();
    println!("---- Query 4: Update the price of a specific book ({REPRICED_TITLE}) ----");
    let step = Step::start(stats, "reprice_book");
    let repriced = basic::reprice_book(catalog, REPRICED_TITLE, NEW_PRICE).await?;
    step.finish(stats, usize::from(repriced.book.is_some()));
    outcome.books_modified = repriced.modified_count;
    println!("{} book(s) updated.", repriced.modified_count);
    match &repriced.book {
        Some(book) => match book.price {
            Some(price) => println!(
                "Updated book: {} - New Price: ${price}",
                book.title.as_deref().unwrap_or(REPRICED_TITLE)
            ),
            None => println!(
                "Updated book: {} - New Price: unknown",
                book.title.as_deref().unwrap_or(REPRICED_TITLE)
            ),
        },
        None => println!("Updated book: {REPRICED_TITLE} not found"),
    }

    println!();
    println!("---- Query 5: Delete a book by title ({REMOVED_TITLE}) ----");
    let step = Step::start(stats, "remove_book");
    let removed = basic::remove_book(catalog, REMOVED_TITLE).await?;
    step.finish(stats, usize::from(removed.remaining.is_some()));
    outcome.books_deleted = removed.deleted_count;
    println!("{} book(s) deleted.", removed.deleted_count);
    match &removed.remaining {
        Some(book) => println!("Found {REMOVED_TITLE}: {book:?}"),
        None => println!("Found {REMOVED_TITLE}: null"),
    }

    // ============ Advanced queries ============
    println!();
    println!("---- Advanced Queries on Books Collection ----");

    println!();
    println!(
        "Finding books in stock and published after {IN_STOCK_AFTER_YEAR} with projection: title, author, and price"
    );
    let step = Step::start(stats, "in_stock_after");
    let in_stock = advanced::in_stock_after(catalog, IN_STOCK_AFTER_YEAR).await?;
    step.finish(stats, in_stock.len());
    print_documents(&in_stock);

    for order in [SortOrder::Ascending, SortOrder::Descending] {
        println!();
        println!("Books sorted by price in {} order:", order.label());
        let step = Step::start(stats, "titles_by_price");
        let sorted = advanced::titles_by_price(catalog, order).await?;
        step.finish(stats, sorted.len());
        print_documents(&sorted);
    }

    println!();
    println!("Paginated books ({PAGE_SIZE} per page):");
    let step = Step::start(stats, "paginate");
    let pages = advanced::paginate(catalog, PAGE_SIZE).await?;
    step.finish(stats, pages.iter().map(Vec::len).sum());
    outcome.pages = pages.len();
    for (index, page) in pages.iter().enumerate() {
        println!("Page {}:", index + 1);
        print_documents(page);
    }

    // ============ Aggregation ============
    println!();
    println!("---- Aggregation Operations on Books Collection ----");

    println!();
    println!("Calculating the average price of books by genre:");
    let step = Step::start(stats, "average_price_by_genre");
    let averages = aggregation::average_price_by_genre(catalog).await?;
    step.finish(stats, averages.len());
    for row in &averages {
        let genre = row.genre.as_deref().unwrap_or("null");
        match row.average_price {
            Some(average) => println!("  {genre}: {average:.2}"),
            None => println!("  {genre}: null"),
        }
    }

    println!();
    println!("Finding the author with the most books");
    let step = Step::start(stats, "top_author");
    let top = aggregation::top_author(catalog).await?;
    step.finish(stats, usize::from(top.is_some()));
    match &top {
        Some(row) => println!(
            "  {}: {} book(s)",
            row.author.as_deref().unwrap_or("null"),
            row.book_count
        ),
        None => println!("  (none)"),
    }

    println!();
    println!("Books grouped by publication decade:");
    let step = Step::start(stats, "books_by_decade");
    let decades = aggregation::books_by_decade(catalog).await?;
    step.finish(stats, decades.len());
    for group in &decades {
        let decade = group
            .decade
            .map_or_else(|| "null".to_string(), |decade| format!("{decade}s"));
        println!("  {decade}: {} book(s) {:?}", group.count, group.titles);
    }

    // ============ Indexing ============
    println!();
    println!("---- Indexing ----");

    println!();
    println!("Creating an index on the \"title\" field and a compound index on \"author\" and \"published_year\"....");
    let step = Step::start(stats, "create_indexes");
    let indexes = indexing::create_indexes(catalog).await?;
    step.finish(stats, 0);
    for name in &indexes {
        println!("Index '{name}' ready");
    }
    outcome.indexes = indexes;

    println!();
    println!("Explaining query performance with indexes...");

    println!();
    println!("Explain for finding \"{TITLE_LOOKUP}\" (using title index):");
    let step = Step::start(stats, "explain_title_lookup");
    let plan = indexing::explain_title_lookup(catalog, TITLE_LOOKUP).await?;
    step.finish(stats, 0);
    print_plan(&plan);

    println!();
    println!(
        "Explain for finding books by \"{INDEXED_AUTHOR}\" published after {RECENT_YEAR} (using compound index):"
    );
    let step = Step::start(stats, "explain_author_since");
    let plan = indexing::explain_author_since(catalog, INDEXED_AUTHOR, RECENT_YEAR).await?;
    step.finish(stats, 0);
    print_plan(&plan);

    Ok(outcome)
}
