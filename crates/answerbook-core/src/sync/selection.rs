//! Which books answers are drawn from, and the draw itself.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, error};

use super::{SyncError, UserCollections};
use crate::models::{Answer, Book, BOOK_ID_FIELD};
use crate::store::{DocumentStore, Filter, Query, MAX_IN_FILTER_VALUES};

/// Client-local set of book ids, in the order they were selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: Vec<String>,
    seeded: bool,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, book_id: &str) -> bool {
        self.ids.iter().any(|id| id == book_id)
    }

    /// Flip membership of one book. Returns whether it is now selected.
    pub fn toggle(&mut self, book_id: &str) -> bool {
        if let Some(pos) = self.ids.iter().position(|id| id == book_id) {
            self.ids.remove(pos);
            false
        } else {
            self.ids.push(book_id.to_string());
            true
        }
    }

    pub fn select(&mut self, book_id: &str) {
        if !self.contains(book_id) {
            self.ids.push(book_id.to_string());
        }
    }

    /// Replace the whole selection.
    pub fn set<I, S>(&mut self, book_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids.clear();
        for id in book_ids {
            let id = id.into();
            if !self.contains(&id) {
                self.ids.push(id);
            }
        }
    }

    /// Select the default book the first time a book list containing one
    /// arrives, unless the user already picked something. Returns whether
    /// the selection changed.
    pub fn seed_from(&mut self, books: &[Book]) -> bool {
        if self.seeded {
            return false;
        }
        let Some(default) = books.iter().find(|b| b.is_default) else {
            return false;
        };
        self.seeded = true;
        if self.ids.is_empty() {
            self.ids.push(default.id.clone());
            return true;
        }
        false
    }

    /// Drop ids of books that no longer exist.
    pub fn retain_existing(&mut self, books: &[Book]) {
        self.ids.retain(|id| books.iter().any(|b| &b.id == id));
    }

    /// Forget everything, including whether the default was seeded.
    pub fn reset(&mut self) {
        self.ids.clear();
        self.seeded = false;
    }
}

/// The book a single-book draw uses when none was chosen: the default book,
/// else the first in list order.
pub fn fallback_book(books: &[Book]) -> Option<&Book> {
    books.iter().find(|b| b.is_default).or_else(|| books.first())
}

/// Pick one text uniformly at random.
pub fn pick_uniform<R: Rng + ?Sized>(texts: &[String], rng: &mut R) -> Option<String> {
    texts.choose(rng).cloned()
}

pub struct AnswerDraw {
    store: Arc<dyn DocumentStore>,
    collections: UserCollections,
}

impl AnswerDraw {
    pub fn new(store: Arc<dyn DocumentStore>, collections: UserCollections) -> Self {
        Self { store, collections }
    }

    async fn texts(&self, filter: Filter) -> Result<Vec<String>, SyncError> {
        let query = Query::filtered(self.collections.answers().clone(), filter);
        let docs = self.store.query(&query).await.map_err(|e| {
            error!(error = %e, "Failed to fetch answers for draw");
            SyncError::remote("get an answer", e)
        })?;
        Ok(docs
            .iter()
            .filter_map(|doc| doc.decode::<Answer>().ok())
            .map(|answer| answer.text)
            .collect())
    }

    /// Draw from every selected book. Membership queries are split into
    /// chunks the store accepts.
    pub async fn resolve(&self, selection: &SelectionSet) -> Result<Option<String>, SyncError> {
        if selection.is_empty() {
            return Ok(None);
        }
        let mut texts = Vec::new();
        for chunk in selection.ids().chunks(MAX_IN_FILTER_VALUES) {
            texts.extend(self.texts(Filter::is_in(BOOK_ID_FIELD, chunk.iter().cloned())).await?);
        }
        debug!(books = selection.len(), candidates = texts.len(), "Drawing answer");
        Ok(pick_uniform(&texts, &mut rand::thread_rng()))
    }

    /// Draw from one book; without an explicit book, use `fallback_book`.
    pub async fn resolve_single(&self, book_id: Option<&str>, books: &[Book]) -> Result<Option<String>, SyncError> {
        let book_id = match book_id {
            Some(id) => id.to_string(),
            None => match fallback_book(books) {
                Some(book) => book.id.clone(),
                None => return Ok(None),
            },
        };
        let texts = self.texts(Filter::equals(BOOK_ID_FIELD, book_id.as_str())).await?;
        Ok(pick_uniform(&texts, &mut rand::thread_rng()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, WriteBatch};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn book(id: &str, is_default: bool) -> Book {
        Book {
            id: id.to_string(),
            owner_id: "u1".to_string(),
            name: id.to_string(),
            is_default,
            created_at: None,
        }
    }

    #[test]
    fn test_toggle_and_set() {
        let mut selection = SelectionSet::new();
        assert!(selection.toggle("b1"));
        assert!(selection.toggle("b2"));
        assert!(!selection.toggle("b1"));
        assert_eq!(selection.ids(), ["b2".to_string()]);

        selection.set(["x", "y", "x"]);
        assert_eq!(selection.len(), 2);
    }

    #[test]
    fn test_seed_only_once() {
        let books = vec![book("b1", false), book("default", true)];
        let mut selection = SelectionSet::new();
        assert!(!selection.seed_from(&[book("b1", false)]));
        assert!(selection.seed_from(&books));
        assert_eq!(selection.ids(), ["default".to_string()]);

        selection.toggle("default");
        assert!(!selection.seed_from(&books));
        assert!(selection.is_empty());

        selection.reset();
        assert!(selection.seed_from(&books));
    }

    #[test]
    fn test_seed_keeps_user_choice() {
        let mut selection = SelectionSet::new();
        selection.select("b1");
        assert!(!selection.seed_from(&[book("default", true)]));
        assert_eq!(selection.ids(), ["b1".to_string()]);
    }

    #[test]
    fn test_retain_existing() {
        let mut selection = SelectionSet::new();
        selection.set(["b1", "gone"]);
        selection.retain_existing(&[book("b1", false)]);
        assert_eq!(selection.ids(), ["b1".to_string()]);
    }

    #[test]
    fn test_fallback_book_prefers_default() {
        let books = vec![book("a", false), book("d", true)];
        assert_eq!(fallback_book(&books).unwrap().id, "d");
        assert_eq!(fallback_book(&books[..1]).unwrap().id, "a");
        assert!(fallback_book(&[]).is_none());
    }

    #[test]
    fn test_pick_uniform_covers_all() {
        let texts: Vec<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let seen: HashSet<String> = (0..200).filter_map(|_| pick_uniform(&texts, &mut rng)).collect();
        assert_eq!(seen.len(), 3);
        assert!(pick_uniform(&[], &mut rng).is_none());
    }

    #[tokio::test]
    async fn test_resolve_chunks_large_selections() {
        let store = MemoryStore::new();
        let collections = UserCollections::new("app", "u1");
        let mut batch = WriteBatch::new();
        batch.create(collections.answers(), "a-last", Answer::new_fields("book-44", "only"));
        store.commit(batch).await.unwrap();

        let mut selection = SelectionSet::new();
        selection.set((0..45).map(|i| format!("book-{}", i)));
        let draw = AnswerDraw::new(Arc::new(store.clone()), collections);
        assert_eq!(draw.resolve(&selection).await.unwrap().as_deref(), Some("only"));
        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_selection_skips_query() {
        let store = MemoryStore::new();
        let draw = AnswerDraw::new(Arc::new(store.clone()), UserCollections::new("app", "u1"));
        assert!(draw.resolve(&SelectionSet::new()).await.unwrap().is_none());
        assert!(draw.resolve_single(None, &[]).await.unwrap().is_none());
        assert_eq!(store.query_count(), 0);
    }
}
