//! Client setup and teardown for the bookstore collection.
use anyhow::{Context, Result};
use derive_builder::Builder;
use mongodb::bson::{Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};

use crate::config::APP_NAME;
use crate::model::Book;

#[derive(Debug, Clone, Builder)]
pub struct ConnectArgs {
    #[builder(setter(into))]
    uri: String,
    #[builder(setter(into))]
    database: String,
    #[builder(setter(into))]
    collection: String,
    #[builder(setter(into), default = "APP_NAME.to_string()")]
    app_name: String,
}

/// An open connection to the bookstore collection.
///
/// Holding a `Catalog` means the client is connected. [`Catalog::close`]
/// consumes it, so the client is shut down at most once and cannot be used
/// afterwards.
#[derive(Debug)]
pub struct Catalog {
    client: Client,
    database: Database,
    books: Collection<Book>,
}

/// Create a client for `args.uri` and verify the server is reachable.
///
/// The driver connects lazily, so a `ping` is issued up front to surface
/// unreachable hosts and authentication failures before any query runs.
pub async fn connect(args: ConnectArgs) -> Result<Catalog> {
    let ConnectArgs {
        uri,
        database,
        collection,
        app_name,
    } = args;

    let mut options = ClientOptions::parse(&uri)
        .await
        .with_context(|| format!("Invalid connection string '{uri}'"))?;
    options.app_name = Some(app_name);

    let client = Client::with_options(options).context("Failed to create MongoDB client")?;
    let database = client.database(&database);

    database
        .run_command(doc! { "ping": 1 })
        .await
        .with_context(|| format!("Failed to reach MongoDB server at '{uri}'"))?;

    tracing::info!(
        database = database.name(),
        collection = collection.as_str(),
        "connected"
    );

    let books = database.collection::<Book>(&collection);
    Ok(Catalog {
        client,
        database,
        books,
    })
}

impl Catalog {
    /// Typed handle to the books collection
    pub fn books(&self) -> &Collection<Book> {
        &self.books
    }

    /// Handle decoding into `T`, for projections whose rows are not full books
    pub fn rows<T: Send + Sync>(&self) -> Collection<T> {
        self.books.clone_with_type::<T>()
    }

    /// Untyped handle for projections and aggregations
    pub fn documents(&self) -> Collection<Document> {
        self.rows::<Document>()
    }

    /// Handle to the whole database, for seeding and dropping fixtures
    #[cfg(test)]
    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    pub fn collection_name(&self) -> &str {
        self.books.name()
    }

    /// Run a database command such as `explain`
    pub async fn run_command(&self, command: Document) -> Result<Document> {
        let name = command
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| "<empty>".to_string());
        self.database
            .run_command(command)
            .await
            .with_context(|| format!("Command '{name}' failed"))
    }

    /// Shut the client down, closing every pooled connection.
    pub async fn close(self) {
        let Catalog {
            client,
            database,
            books,
        } = self;
        drop(books);
        drop(database);
        client.shutdown().await;
        tracing::info!("connection closed");
    }
}
