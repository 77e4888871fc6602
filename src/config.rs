//! Configuration constants for the query runner
//!
//! This module centralizes the connection target and every literal value the
//! query sequence filters, updates or deletes by.

// ============================================================================
// Connection Configuration
// ============================================================================

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";

pub const DATABASE_NAME: &str = "plp_bookstore";

pub const COLLECTION_NAME: &str = "books";

/// Reported to the server in the handshake so the session shows up in
/// `currentOp` and the server logs under a recognizable name.
pub const APP_NAME: &str = "bookstore-queries";

// ============================================================================
// Pagination Configuration
// ============================================================================

/// Number of books per page when paginating the whole collection
pub const PAGE_SIZE: u64 = 5;

// ============================================================================
// Query Literals
// ============================================================================

pub const FICTION_GENRE: &str = "Fiction";

pub const RECENT_YEAR: i32 = 1950;

pub const FEATURED_AUTHOR: &str = "George Orwell";

pub const REPRICED_TITLE: &str = "The Great Gatsby";

pub const NEW_PRICE: f64 = 12.99;

pub const REMOVED_TITLE: &str = "Wuthering Heights";

pub const IN_STOCK_AFTER_YEAR: i32 = 2010;

/// Title looked up by the first explained query (served by the title index)
pub const TITLE_LOOKUP: &str = "The Hobbit";

/// Author filtered by the second explained query (served by the compound index)
pub const INDEXED_AUTHOR: &str = "J.R.R. Tolkien";
