//! The query sequence, grouped the way it is printed: basic CRUD, advanced
//! finds, aggregation pipelines, and indexing.
//!
//! Every query document is produced by a small pure builder so it can be
//! inspected without a server; the async functions only send it.

pub mod advanced;
pub mod aggregation;
pub mod basic;
pub mod indexing;

use mongodb::bson::Document;

/// Sort direction for a single-field sort spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Direction value as MongoDB expects it in sort and index specs
    pub fn direction(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }

    pub fn sort_by(self, field: &str) -> Document {
        let mut spec = Document::new();
        spec.insert(field, self.direction());
        spec
    }
}
