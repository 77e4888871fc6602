use bookstore_queries::runner::{
    APP_NAME, COLLECTION_NAME, DATABASE_NAME, DEFAULT_URI, RunArgs, run_queries,
};
use clap::{Parser, Subcommand};

#[derive(Parser, Clone)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Run the full query, aggregation and indexing sequence
    Run {
        /// MongoDB connection string
        #[arg(short, long, default_value = DEFAULT_URI)]
        uri: String,

        /// Database holding the books collection
        #[arg(short, long, default_value = DATABASE_NAME)]
        database: String,

        /// Collection to query
        #[arg(short, long, default_value = COLLECTION_NAME)]
        collection: String,

        /// Application name reported to the server
        #[arg(long, default_value = APP_NAME)]
        app_name: String,

        /// Quiet mode - only warnings and errors are logged
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Command::Run {
            uri,
            database,
            collection,
            app_name,
            quiet,
        } => {
            init_tracing(quiet);

            // The runner has already logged the failure and closed the
            // connection; only the exit status is left to set.
            let Ok(summary) = run_queries(RunArgs {
                uri,
                database,
                collection,
                app_name,
            })
            .await
            else {
                std::process::exit(1);
            };

            if !quiet {
                println!();
                println!("Run Summary");
                println!("===========");
                println!("Collection: {}.{}", summary.database, summary.collection);
                println!("Steps completed: {}", summary.steps_completed);
                println!("Documents returned: {}", summary.documents_returned);
                println!("Books updated: {}", summary.books_modified);
                println!("Books deleted: {}", summary.books_deleted);
                println!("Pages read: {}", summary.pages);
                println!("Indexes: {}", summary.indexes.join(", "));
                println!("Duration: {:.2}s", summary.duration.as_secs_f64());
                println!("Time in queries: {:.2}s", summary.query_time.as_secs_f64());
                if let Some((step, duration)) = summary.slowest_step {
                    println!("Slowest step: {step} ({:.1}ms)", duration.as_secs_f64() * 1000.0);
                }
            }
        }
    }
}

fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    // RUST_LOG wins over the built-in levels when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("bookstore_queries=warn,mongodb=warn")
        } else {
            EnvFilter::new("bookstore_queries=info,mongodb=warn")
        }
    });
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
