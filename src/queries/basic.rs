//! Equality and range finds, the point update and the point delete.
use anyhow::{Context, Result};
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};

use crate::db::Catalog;
use crate::model::{Book, Listing};

/// Outcome of repricing a single book
#[derive(Debug, Clone, PartialEq)]
pub struct RepriceOutcome {
    /// 0 when the title is missing or already carries the new price
    pub modified_count: u64,
    /// The book as re-fetched after the update
    pub book: Option<Book>,
}

/// Outcome of deleting a single book
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveOutcome {
    /// 0 when the title was already gone
    pub deleted_count: u64,
    /// The re-fetch by title after the delete, expected to be `None`
    pub remaining: Option<Book>,
}

pub fn genre_filter(genre: &str) -> Document {
    doc! { "genre": genre }
}

pub fn published_after_filter(year: i32) -> Document {
    doc! { "published_year": { "$gt": year } }
}

pub fn author_filter(author: &str) -> Document {
    doc! { "author": author }
}

pub fn title_filter(title: &str) -> Document {
    doc! { "title": title }
}

pub fn set_price_update(price: f64) -> Document {
    doc! { "$set": { "price": price } }
}

/// Only the title; the genre find prints nothing else
pub fn title_projection() -> Document {
    doc! { "title": 1, "_id": 0 }
}

pub fn title_year_projection() -> Document {
    doc! { "title": 1, "published_year": 1, "_id": 0 }
}

async fn find_listings(
    catalog: &Catalog,
    filter: Document,
    projection: Document,
) -> Result<Vec<Listing>> {
    let listings: Vec<Listing> = catalog
        .rows::<Listing>()
        .find(filter.clone())
        .projection(projection)
        .await
        .with_context(|| format!("Find failed for filter {filter}"))?
        .try_collect()
        .await
        .with_context(|| format!("Failed to read results for filter {filter}"))?;
    Ok(listings)
}

/// Titles of every book in `genre`
pub async fn books_in_genre(catalog: &Catalog, genre: &str) -> Result<Vec<String>> {
    let listings = find_listings(catalog, genre_filter(genre), title_projection()).await?;
    Ok(listings
        .iter()
        .map(|listing| listing.title_or_placeholder().to_string())
        .collect())
}

/// Title and year of every book published strictly after `year`
pub async fn books_published_after(catalog: &Catalog, year: i32) -> Result<Vec<Listing>> {
    find_listings(catalog, published_after_filter(year), title_year_projection()).await
}

/// Title and year of every book written by `author`
pub async fn books_by_author(catalog: &Catalog, author: &str) -> Result<Vec<Listing>> {
    find_listings(catalog, author_filter(author), title_year_projection()).await
}

/// Set the price of the first book titled `title`, then re-fetch it.
pub async fn reprice_book(catalog: &Catalog, title: &str, price: f64) -> Result<RepriceOutcome> {
    let result = catalog
        .books()
        .update_one(title_filter(title), set_price_update(price))
        .await
        .with_context(|| format!("Failed to update price of '{title}'"))?;

    let book = catalog
        .books()
        .find_one(title_filter(title))
        .await
        .with_context(|| format!("Failed to re-fetch '{title}'"))?;

    Ok(RepriceOutcome {
        modified_count: result.modified_count,
        book,
    })
}

/// Delete the first book titled `title`, then confirm it is gone.
///
/// Deleting an absent title is not an error; it reports zero deletions.
pub async fn remove_book(catalog: &Catalog, title: &str) -> Result<RemoveOutcome> {
    let result = catalog
        .books()
        .delete_one(title_filter(title))
        .await
        .with_context(|| format!("Failed to delete '{title}'"))?;

    let remaining = catalog
        .books()
        .find_one(title_filter(title))
        .await
        .with_context(|| format!("Failed to re-fetch '{title}'"))?;

    Ok(RemoveOutcome {
        deleted_count: result.deleted_count,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_filter_is_strictly_greater() {
        assert_eq!(
            published_after_filter(1950),
            doc! { "published_year": { "$gt": 1950 } }
        );
    }

    #[test]
    fn test_price_update_only_sets_price() {
        let update = set_price_update(12.99);
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get_f64("price").unwrap(), 12.99);
    }

    #[test]
    fn test_listing_projections_drop_id() {
        assert_eq!(title_projection(), doc! { "title": 1, "_id": 0 });
        let projection = title_year_projection();
        assert_eq!(projection.get_i32("published_year").unwrap(), 1);
        assert_eq!(projection.get_i32("_id").unwrap(), 0);
        assert!(!projection.contains_key("price"));
    }

    #[test]
    fn test_equality_filters() {
        assert_eq!(genre_filter("Fiction"), doc! { "genre": "Fiction" });
        assert_eq!(author_filter("George Orwell"), doc! { "author": "George Orwell" });
        assert_eq!(
            title_filter("Wuthering Heights"),
            doc! { "title": "Wuthering Heights" }
        );
    }
}
