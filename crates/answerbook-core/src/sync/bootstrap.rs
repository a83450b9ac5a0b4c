//! Default book bootstrap.
//!
//! Every user gets exactly one default book, seeded with the locale's
//! answers. The book has the fixed id `default` and is created with a
//! create-if-absent precondition in the same batch as its answers, so a
//! second device racing the same bootstrap fails the whole batch instead of
//! writing a duplicate.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use super::{BootstrapError, UserCollections};
use crate::locale::Locale;
use crate::models::{Answer, Book, DEFAULT_BOOK_ID, IS_DEFAULT_FIELD};
use crate::store::{DocumentStore, Filter, Query, StoreError, WriteBatch};
use crate::utils::new_document_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    AlreadyPresent,
    Created { answers: usize },
    /// Another bootstrap is running in this process
    Busy,
}

#[derive(Debug, Default)]
pub struct DefaultBookBootstrapper {
    busy: AtomicBool,
}

/// Clears the busy flag however the bootstrap ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DefaultBookBootstrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn ensure_default_book(
        &self,
        store: &dyn DocumentStore,
        collections: &UserCollections,
        locale: Locale,
    ) -> Result<BootstrapOutcome, BootstrapError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(BootstrapOutcome::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let query = Query::filtered(collections.books().clone(), Filter::equals(IS_DEFAULT_FIELD, true));
        let existing = store.query(&query).await.map_err(|e| {
            error!(user_id = collections.user_id(), error = %e, "Failed to check for default book");
            BootstrapError::Check(e)
        })?;
        if !existing.is_empty() {
            return Ok(BootstrapOutcome::AlreadyPresent);
        }

        info!(user_id = collections.user_id(), locale = %locale, "No default book found, creating one");
        let seeds = locale.seed_answers();
        let mut batch = WriteBatch::new();
        batch.create(
            collections.books(),
            DEFAULT_BOOK_ID,
            Book::default_fields(collections.user_id(), locale),
        );
        for text in seeds {
            batch.create(
                collections.answers(),
                new_document_id(),
                Answer::new_fields(DEFAULT_BOOK_ID, text),
            );
        }

        match store.commit(batch).await {
            Ok(()) => {
                info!(user_id = collections.user_id(), answers = seeds.len(), "Created default book");
                Ok(BootstrapOutcome::Created { answers: seeds.len() })
            }
            Err(StoreError::AlreadyExists(detail)) => {
                warn!(user_id = collections.user_id(), detail = %detail, "Default book was created concurrently");
                Ok(BootstrapOutcome::AlreadyPresent)
            }
            Err(e) => {
                error!(user_id = collections.user_id(), error = %e, "Failed to create default book");
                Err(BootstrapError::Create(e))
            }
        }
    }
}
