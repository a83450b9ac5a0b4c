//! Book and answer edits.
//!
//! Mutations do not touch the projections; the live queries pick the change
//! up. Input is validated before any remote call.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::{SyncError, UserCollections, ValidationError};
use crate::models::{Answer, Book, BOOK_ID_FIELD};
use crate::store::{DocumentStore, Filter, Query, WriteBatch, MAX_BATCH_WRITES};
use crate::utils::{new_document_id, non_empty_lines, normalize_text};

pub struct Mutations {
    store: Arc<dyn DocumentStore>,
    collections: UserCollections,
}

impl Mutations {
    pub fn new(store: Arc<dyn DocumentStore>, collections: UserCollections) -> Self {
        Self { store, collections }
    }

    pub fn collections(&self) -> &UserCollections {
        &self.collections
    }

    pub async fn create_book(&self, name: &str) -> Result<String, SyncError> {
        let name = normalize_text(name).ok_or(ValidationError::EmptyBookName)?;
        let id = self
            .store
            .create(
                self.collections.books(),
                Book::new_fields(self.collections.user_id(), &name),
            )
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to create book");
                SyncError::remote("create book", e)
            })?;
        info!(book_id = %id, "Created book");
        Ok(id)
    }

    /// Rename a book. Only the name field is written.
    pub async fn rename_book(&self, book_id: &str, name: &str) -> Result<(), SyncError> {
        let name = normalize_text(name).ok_or(ValidationError::EmptyBookName)?;
        self.store
            .update(self.collections.books(), book_id, Book::rename_fields(&name))
            .await
            .map_err(|e| {
                error!(book_id = book_id, error = %e, "Failed to rename book");
                SyncError::remote("rename book", e)
            })
    }

    /// Delete a book and every answer that points at it in one batch.
    /// Returns the number of answers removed.
    pub async fn delete_book(&self, book_id: &str) -> Result<usize, SyncError> {
        let query = Query::filtered(
            self.collections.answers().clone(),
            Filter::equals(BOOK_ID_FIELD, book_id),
        );
        let answers = self.store.query(&query).await.map_err(|e| {
            error!(book_id = book_id, error = %e, "Failed to list answers for delete");
            SyncError::remote("delete book", e)
        })?;

        // The book goes in the last batch so a partial failure never
        // leaves answers without their book.
        let mut batches: Vec<WriteBatch> = answers
            .chunks(MAX_BATCH_WRITES - 1)
            .map(|chunk| {
                let mut batch = WriteBatch::new();
                for answer in chunk {
                    batch.delete(self.collections.answers(), answer.id.clone());
                }
                batch
            })
            .collect();
        if batches.is_empty() {
            batches.push(WriteBatch::new());
        }
        if batches.len() > 1 {
            warn!(book_id = book_id, batches = batches.len(), "Book too large to delete atomically");
        }
        if let Some(last) = batches.last_mut() {
            last.delete(self.collections.books(), book_id);
        }

        for batch in batches {
            self.store.commit(batch).await.map_err(|e| {
                error!(book_id = book_id, error = %e, "Failed to delete book");
                SyncError::remote("delete book", e)
            })?;
        }
        info!(book_id = book_id, answers = answers.len(), "Deleted book");
        Ok(answers.len())
    }

    pub async fn add_answer(&self, book_id: &str, text: &str) -> Result<String, SyncError> {
        let text = normalize_text(text).ok_or(ValidationError::EmptyAnswerText)?;
        self.store
            .create(self.collections.answers(), Answer::new_fields(book_id, &text))
            .await
            .map_err(|e| {
                error!(book_id = book_id, error = %e, "Failed to add answer");
                SyncError::remote("add answer", e)
            })
    }

    /// Add one answer per non-empty line, in order, as one batch.
    /// Returns the number of answers written.
    pub async fn add_answers(&self, book_id: &str, text: &str) -> Result<usize, SyncError> {
        let lines = non_empty_lines(text);
        if lines.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }

        let batch = self.answers_batch(book_id, &lines);
        self.store.commit(batch).await.map_err(|e| {
            error!(book_id = book_id, count = lines.len(), error = %e, "Failed to add answers");
            SyncError::remote("add answers", e)
        })?;
        info!(book_id = book_id, count = lines.len(), "Added answers");
        Ok(lines.len())
    }

    /// One create per line, in line order.
    fn answers_batch(&self, book_id: &str, lines: &[String]) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for line in lines {
            batch.create(
                self.collections.answers(),
                new_document_id(),
                Answer::new_fields(book_id, line),
            );
        }
        batch
    }

    pub async fn edit_answer(&self, answer_id: &str, text: &str) -> Result<(), SyncError> {
        let text = normalize_text(text).ok_or(ValidationError::EmptyAnswerText)?;
        self.store
            .update(self.collections.answers(), answer_id, Answer::edit_fields(&text))
            .await
            .map_err(|e| {
                error!(answer_id = answer_id, error = %e, "Failed to edit answer");
                SyncError::remote("update answer", e)
            })
    }

    pub async fn delete_answer(&self, answer_id: &str) -> Result<(), SyncError> {
        self.store
            .delete(self.collections.answers(), answer_id)
            .await
            .map_err(|e| {
                error!(answer_id = answer_id, error = %e, "Failed to delete answer");
                SyncError::remote("delete answer", e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IS_DEFAULT_FIELD, NAME_FIELD, TEXT_FIELD};
    use crate::store::{MemoryStore, StoreError, Write};

    fn setup() -> (MemoryStore, Mutations) {
        let store = MemoryStore::new();
        let mutations = Mutations::new(Arc::new(store.clone()), UserCollections::new("app", "u1"));
        (store, mutations)
    }

    async fn answers_of(store: &MemoryStore, collections: &UserCollections, book_id: &str) -> Vec<Answer> {
        let query = Query::filtered(collections.answers().clone(), Filter::equals(BOOK_ID_FIELD, book_id));
        store
            .query(&query)
            .await
            .unwrap()
            .iter()
            .map(|d| d.decode().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_blank_input_never_reaches_store() {
        let (store, mutations) = setup();
        assert!(matches!(
            mutations.create_book("   ").await,
            Err(SyncError::Validation(ValidationError::EmptyBookName))
        ));
        assert!(matches!(
            mutations.rename_book("b1", "\t").await,
            Err(SyncError::Validation(ValidationError::EmptyBookName))
        ));
        assert!(matches!(
            mutations.add_answer("b1", "").await,
            Err(SyncError::Validation(ValidationError::EmptyAnswerText))
        ));
        assert!(matches!(
            mutations.edit_answer("a1", "  ").await,
            Err(SyncError::Validation(ValidationError::EmptyAnswerText))
        ));
        assert!(matches!(
            mutations.add_answers("b1", "\n  \n").await,
            Err(SyncError::Validation(ValidationError::EmptyBatch))
        ));
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_add_skips_blank_lines_in_one_commit() {
        let (store, mutations) = setup();
        let added = mutations.add_answers("b1", "a\n\nb\n  \nc").await.unwrap();
        assert_eq!(added, 3);
        assert_eq!(store.commit_count(), 1);

        let mut texts: Vec<String> = answers_of(&store, mutations.collections(), "b1")
            .await
            .into_iter()
            .map(|a| a.text)
            .collect();
        texts.sort();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_answers_batch_keeps_line_order() {
        let (_store, mutations) = setup();
        let lines = non_empty_lines("third\nfirst\n\nsecond");
        let batch = mutations.answers_batch("b1", &lines);

        let texts: Vec<&str> = batch
            .writes()
            .iter()
            .map(|write| match write {
                Write::Create { fields, .. } => fields[TEXT_FIELD].as_str().unwrap(),
                other => panic!("unexpected write {:?}", other),
            })
            .collect();
        assert_eq!(texts, vec!["third", "first", "second"]);
    }

    #[tokio::test]
    async fn test_rename_keeps_default_flag() {
        let (store, mutations) = setup();
        let collections = mutations.collections().clone();
        let mut batch = WriteBatch::new();
        batch.create(collections.books(), "default", Book::default_fields("u1", crate::Locale::Zh));
        store.commit(batch).await.unwrap();

        mutations.rename_book("default", "  My answers ").await.unwrap();
        let docs = store.query(&Query::all(collections.books().clone())).await.unwrap();
        assert_eq!(docs[0].get(NAME_FIELD).unwrap(), "My answers");
        assert_eq!(docs[0].get(IS_DEFAULT_FIELD).unwrap(), true);
    }

    #[tokio::test]
    async fn test_delete_book_cascades() {
        let (store, mutations) = setup();
        let keep = mutations.create_book("Keep").await.unwrap();
        let doomed = mutations.create_book("Doomed").await.unwrap();
        mutations.add_answers(&doomed, "one\ntwo\nthree").await.unwrap();
        mutations.add_answer(&keep, "stay").await.unwrap();
        let before = store.document_count();

        let removed = mutations.delete_book(&doomed).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.document_count(), before - 4);
        assert!(answers_of(&store, mutations.collections(), &doomed).await.is_empty());
        assert_eq!(answers_of(&store, mutations.collections(), &keep).await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_large_book_spans_batches() {
        let (store, mutations) = setup();
        let book = mutations.create_book("Big").await.unwrap();
        let lines: Vec<String> = (0..MAX_BATCH_WRITES + 20).map(|i| format!("answer {}", i)).collect();
        for chunk in lines.chunks(MAX_BATCH_WRITES) {
            mutations.add_answers(&book, &chunk.join("\n")).await.unwrap();
        }

        let removed = mutations.delete_book(&book).await.unwrap();
        assert_eq!(removed, MAX_BATCH_WRITES + 20);
        assert_eq!(store.document_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_reports_summary() {
        let (store, mutations) = setup();
        store.fail_next_commits(1);
        let err = mutations.add_answers("b1", "x\ny").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to add answers");
        assert!(matches!(err, SyncError::Remote { source: StoreError::Unavailable(_), .. }));
        assert_eq!(store.document_count(), 0);
    }

    #[tokio::test]
    async fn test_edit_and_delete_answer() {
        let (store, mutations) = setup();
        let id = mutations.add_answer("b1", "draft").await.unwrap();
        mutations.edit_answer(&id, " final ").await.unwrap();
        assert_eq!(answers_of(&store, mutations.collections(), "b1").await[0].text, "final");

        mutations.delete_answer(&id).await.unwrap();
        assert_eq!(store.document_count(), 0);
        assert!(matches!(
            mutations.edit_answer(&id, "ghost").await,
            Err(SyncError::Remote { source: StoreError::NotFound(_), .. })
        ));
    }
}
