//! Compound filters with projection, sorted finds, and pagination.
use anyhow::{Context, Result};
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};

use super::SortOrder;
use crate::db::Catalog;

/// One page of a paginated scan: which slice of the sorted collection to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub index: u64,
    pub skip: u64,
    pub limit: i64,
}

pub fn in_stock_after_filter(year: i32) -> Document {
    doc! { "in_stock": true, "published_year": { "$gt": year } }
}

pub fn title_author_price_projection() -> Document {
    doc! { "title": 1, "author": 1, "price": 1 }
}

pub fn title_price_projection() -> Document {
    doc! { "title": 1, "price": 1, "_id": 0 }
}

pub fn title_author_projection() -> Document {
    doc! { "title": 1, "author": 1, "_id": 0 }
}

/// Sort used for every page.
///
/// Titles are not unique, so `_id` breaks ties; without it two books sharing
/// a title could swap places between page reads and one would be skipped.
pub fn page_sort() -> Document {
    doc! { "title": 1, "_id": 1 }
}

/// Number of pages needed to cover `total` documents
pub fn page_count(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// Skip/limit windows that together cover `total` documents exactly once
pub fn page_windows(total: u64, page_size: u64) -> Vec<PageWindow> {
    let limit = i64::try_from(page_size).unwrap_or(i64::MAX);
    (0..page_count(total, page_size))
        .map(|index| PageWindow {
            index,
            skip: index * page_size,
            limit,
        })
        .collect()
}

/// Books in stock and published after `year`, projected to title, author and
/// price (plus `_id`)
pub async fn in_stock_after(catalog: &Catalog, year: i32) -> Result<Vec<Document>> {
    let docs: Vec<Document> = catalog
        .documents()
        .find(in_stock_after_filter(year))
        .projection(title_author_price_projection())
        .await
        .context("Failed to find in-stock books")?
        .try_collect()
        .await
        .context("Failed to read in-stock books")?;
    Ok(docs)
}

/// Every book as `{ title, price }`, ordered by price
pub async fn titles_by_price(catalog: &Catalog, order: SortOrder) -> Result<Vec<Document>> {
    let docs: Vec<Document> = catalog
        .documents()
        .find(doc! {})
        .projection(title_price_projection())
        .sort(order.sort_by("price"))
        .await
        .with_context(|| format!("Failed to sort books by price ({})", order.label()))?
        .try_collect()
        .await
        .with_context(|| format!("Failed to read books sorted by price ({})", order.label()))?;
    Ok(docs)
}

/// Read the whole collection as `{ title, author }` pages of `page_size`.
pub async fn paginate(catalog: &Catalog, page_size: u64) -> Result<Vec<Vec<Document>>> {
    let total = catalog
        .books()
        .count_documents(doc! {})
        .await
        .context("Failed to count books")?;

    let windows = page_windows(total, page_size);
    tracing::debug!(total, pages = windows.len(), "paginating");

    let mut pages = Vec::with_capacity(windows.len());
    for window in windows {
        let page: Vec<Document> = catalog
            .documents()
            .find(doc! {})
            .projection(title_author_projection())
            .sort(page_sort())
            .skip(window.skip)
            .limit(window.limit)
            .await
            .with_context(|| format!("Failed to fetch page {}", window.index + 1))?
            .try_collect()
            .await
            .with_context(|| format!("Failed to read page {}", window.index + 1))?;
        pages.push(page);
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 5), 0);
        assert_eq!(page_count(1, 5), 1);
        assert_eq!(page_count(5, 5), 1);
        assert_eq!(page_count(6, 5), 2);
        assert_eq!(page_count(12, 5), 3);
        assert_eq!(page_count(12, 0), 0);
    }

    #[test]
    fn test_page_windows_cover_every_position_once() {
        for total in 0..=40u64 {
            let windows = page_windows(total, 5);
            let mut covered = Vec::new();
            for window in &windows {
                let end = (window.skip + window.limit as u64).min(total);
                assert!(window.skip < total, "empty page for total {total}");
                covered.extend(window.skip..end);
            }
            let expected: Vec<u64> = (0..total).collect();
            assert_eq!(covered, expected, "total {total}");
        }
    }

    #[test]
    fn test_page_windows_are_numbered_in_order() {
        let windows = page_windows(11, 5);
        assert_eq!(
            windows,
            vec![
                PageWindow { index: 0, skip: 0, limit: 5 },
                PageWindow { index: 1, skip: 5, limit: 5 },
                PageWindow { index: 2, skip: 10, limit: 5 },
            ]
        );
    }

    #[test]
    fn test_sorted_projection_excludes_id() {
        assert_eq!(title_price_projection().get_i32("_id").unwrap(), 0);
        assert_eq!(title_author_projection().get_i32("_id").unwrap(), 0);
        assert!(!title_author_price_projection().contains_key("_id"));
    }

    #[test]
    fn test_page_sort_has_unique_tiebreak() {
        let sort = page_sort();
        let keys: Vec<&str> = sort.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["title", "_id"]);
    }

    #[test]
    fn test_in_stock_filter_combines_both_predicates() {
        let filter = in_stock_after_filter(2010);
        assert!(filter.get_bool("in_stock").unwrap());
        assert_eq!(
            filter.get_document("published_year").unwrap(),
            &doc! { "$gt": 2010 }
        );
    }
}
