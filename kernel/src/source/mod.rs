// Membership Source
//
// Boundary to the remote provider of collection membership. Providers
// page their results; `fetch_members` walks the pages so callers only
// ever see a complete snapshot.

use std::collections::{HashMap, HashSet};

use crate::snapshot::{Snapshot, TrackedItem};

/// One page of membership as returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberPage {
    pub items: Vec<TrackedItem>,

    /// Cursor of the following page, absent on the last one.
    pub next: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("collection {collection_id} unavailable: {reason}")]
    Unavailable {
        collection_id: String,
        reason: String,
    },

    #[error("malformed page for collection {collection_id}: {reason}")]
    Malformed {
        collection_id: String,
        reason: String,
    },

    #[error("collection {collection_id} pages loop back to cursor {cursor}")]
    PageCycle {
        collection_id: String,
        cursor: String,
    },
}

pub trait MembershipSource {
    /// Fetch one page; `cursor` is `None` for the first page.
    fn fetch_page(&self, collection_id: &str, cursor: Option<&str>)
        -> Result<MemberPage, SourceError>;

    /// Fetch the complete, ordered membership of a collection.
    fn fetch_members(&self, collection_id: &str) -> Result<Snapshot, SourceError> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.fetch_page(collection_id, cursor.as_deref())?;
            items.extend(page.items);

            match page.next {
                Some(next) => {
                    if !visited.insert(next.clone()) {
                        return Err(SourceError::PageCycle {
                            collection_id: collection_id.to_string(),
                            cursor: next,
                        });
                    }
                    cursor = Some(next);
                }
                None => break,
            }
        }

        Ok(Snapshot::new(items))
    }
}

/// Source serving fixed pages, keyed by collection id.
///
/// Cursors are page indices. Collections marked as failing return
/// `Unavailable`.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    pages: HashMap<String, Vec<Vec<TrackedItem>>>,
    failing: HashSet<String>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `items` for `collection_id`, split into pages of `page_size`.
    pub fn set(&mut self, collection_id: &str, items: Vec<TrackedItem>, page_size: usize) {
        let pages = if items.is_empty() {
            vec![Vec::new()]
        } else {
            items
                .chunks(page_size.max(1))
                .map(|chunk| chunk.to_vec())
                .collect()
        };
        self.failing.remove(collection_id);
        self.pages.insert(collection_id.to_string(), pages);
    }

    pub fn fail(&mut self, collection_id: &str) {
        self.failing.insert(collection_id.to_string());
    }
}

impl MembershipSource for InMemorySource {
    fn fetch_page(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> Result<MemberPage, SourceError> {
        let unavailable = |reason: &str| SourceError::Unavailable {
            collection_id: collection_id.to_string(),
            reason: reason.to_string(),
        };

        if self.failing.contains(collection_id) {
            return Err(unavailable("provider error"));
        }
        let pages = self
            .pages
            .get(collection_id)
            .ok_or_else(|| unavailable("unknown collection"))?;

        let index = match cursor {
            None => 0,
            Some(cursor) => cursor.parse::<usize>().map_err(|_| unavailable("bad cursor"))?,
        };
        let items = pages
            .get(index)
            .cloned()
            .ok_or_else(|| unavailable("page out of range"))?;
        let next = (index + 1 < pages.len()).then(|| (index + 1).to_string());

        Ok(MemberPage { items, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<TrackedItem> {
        (0..n)
            .map(|i| TrackedItem::new(format!("Song {i} - Artist"), None))
            .collect()
    }

    #[test]
    fn pagination_is_transparent() {
        let mut source = InMemorySource::new();
        source.set("abc", items(7), 3);

        let snapshot = source.fetch_members("abc").unwrap();

        assert_eq!(snapshot.len(), 7);
        assert_eq!(snapshot.items[6].key, "Song 6 - Artist");
    }

    #[test]
    fn empty_collection_is_one_empty_page() {
        let mut source = InMemorySource::new();
        source.set("abc", Vec::new(), 3);

        assert!(source.fetch_members("abc").unwrap().is_empty());
    }

    #[test]
    fn failing_collection_reports_unavailable() {
        let mut source = InMemorySource::new();
        source.set("abc", items(2), 3);
        source.fail("abc");

        assert!(matches!(
            source.fetch_members("abc").unwrap_err(),
            SourceError::Unavailable { .. }
        ));
    }

    struct Looping;

    impl MembershipSource for Looping {
        fn fetch_page(&self, _: &str, _: Option<&str>) -> Result<MemberPage, SourceError> {
            Ok(MemberPage {
                items: Vec::new(),
                next: Some("again".into()),
            })
        }
    }

    #[test]
    fn cyclic_cursors_are_detected() {
        assert!(matches!(
            Looping.fetch_members("abc").unwrap_err(),
            SourceError::PageCycle { .. }
        ));
    }
}
