//! Per-session application context.
//!
//! `AnswerBookApp` owns everything that used to be process-global: the
//! signed-in identity, both live projections, the open book, the selection
//! and the bootstrapper. Front ends drive it with identity changes and user
//! actions and read `SyncEvent`s from the channel returned by `new`.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::auth::{Identity, IdentityProvider};
use crate::locale::Locale;
use crate::models::{Answer, Book, BOOK_ID_FIELD};
use crate::store::{DocumentStore, Filter, Query};
use crate::sync::{
    AnswerDraw, BootstrapOutcome, DefaultBookBootstrapper, Mutations, Projection, ProjectionScope,
    SelectionSet, SyncError, SyncEvent, UserCollections,
};

struct SessionState {
    identity: Identity,
    collections: UserCollections,
    mutations: Mutations,
    draw: AnswerDraw,
}

pub struct AnswerBookApp {
    app_id: String,
    locale: Locale,
    store: Arc<dyn DocumentStore>,
    identity_provider: Arc<dyn IdentityProvider>,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    bootstrapper: DefaultBookBootstrapper,
    session: Option<SessionState>,
    books: Projection<Book>,
    answers: Projection<Answer>,
    open_book: Option<String>,
    selection: SelectionSet,
}

impl AnswerBookApp {
    pub fn new(
        app_id: impl Into<String>,
        locale: Locale,
        store: Arc<dyn DocumentStore>,
        identity_provider: Arc<dyn IdentityProvider>,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let app = Self {
            app_id: app_id.into(),
            locale,
            store,
            identity_provider,
            events_tx,
            bootstrapper: DefaultBookBootstrapper::new(),
            session: None,
            books: Projection::new(ProjectionScope::Books),
            answers: Projection::new(ProjectionScope::Answers),
            open_book: None,
            selection: SelectionSet::new(),
        };
        (app, events_rx)
    }

    fn emit(&self, event: SyncEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    fn session(&self) -> Result<&SessionState, SyncError> {
        self.session.as_ref().ok_or(SyncError::NoSession)
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Changes published by the identity provider.
    pub fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.identity_provider.watch()
    }

    /// Start from whatever identity the provider currently has.
    pub async fn start(&mut self) -> Result<(), SyncError> {
        let current = self.identity_provider.current();
        self.handle_identity_change(current).await
    }

    /// React to a sign-in, sign-out or account switch.
    ///
    /// Everything tied to the previous identity is torn down first. With no
    /// identity an anonymous session is created; with one, the default book
    /// is ensured and the book list subscribed. Repeating the current
    /// identity is a no-op.
    pub async fn handle_identity_change(&mut self, identity: Option<Identity>) -> Result<(), SyncError> {
        if let (Some(new), Some(current)) = (&identity, &mut self.session) {
            if new.user_id == current.identity.user_id {
                current.identity = new.clone();
                return Ok(());
            }
        }

        self.teardown();

        let identity = match identity {
            Some(identity) => identity,
            None => {
                info!("No identity, signing in anonymously");
                self.identity_provider.sign_in_anonymously().await?
            }
        };

        info!(user_id = %identity.user_id, anonymous = identity.is_anonymous, "Session started");
        let collections = UserCollections::new(&self.app_id, &identity.user_id);
        self.session = Some(SessionState {
            identity: identity.clone(),
            mutations: Mutations::new(Arc::clone(&self.store), collections.clone()),
            draw: AnswerDraw::new(Arc::clone(&self.store), collections.clone()),
            collections,
        });
        self.emit(SyncEvent::SessionChanged(Some(identity)));

        self.run_bootstrap().await;
        self.subscribe_books().await
    }

    fn teardown(&mut self) {
        if self.session.take().is_some() {
            debug!("Tearing down previous session");
            self.emit(SyncEvent::SessionChanged(None));
        }
        self.answers.cancel();
        self.books.cancel();
        self.open_book = None;
        self.selection.reset();
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.identity)
    }

    // ------------------------------------------------------------------
    // Bootstrap and locale
    // ------------------------------------------------------------------

    /// Ensure the default book exists. Failures are logged and reported as
    /// an event; the session continues without it.
    async fn run_bootstrap(&self) -> Option<BootstrapOutcome> {
        let session = self.session.as_ref()?;
        match self
            .bootstrapper
            .ensure_default_book(self.store.as_ref(), &session.collections, self.locale)
            .await
        {
            Ok(outcome) => {
                debug!(outcome = ?outcome, "Bootstrap finished");
                Some(outcome)
            }
            Err(e) => {
                error!(error = %e, "Default book bootstrap failed");
                self.emit(SyncEvent::BootstrapFailed(e.to_string()));
                None
            }
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Switch locale and re-run the default book check.
    pub async fn set_locale(&mut self, locale: Locale) -> Option<BootstrapOutcome> {
        self.locale = locale;
        self.run_bootstrap().await
    }

    // ------------------------------------------------------------------
    // Projections
    // ------------------------------------------------------------------

    /// (Re)subscribe the book list of the current user.
    pub async fn subscribe_books(&mut self) -> Result<(), SyncError> {
        let query = Query::all(self.session()?.collections.books().clone());
        self.books
            .subscribe(self.store.as_ref(), query, self.events_tx.clone(), SyncEvent::BooksChanged)
            .await
    }

    pub fn books(&self) -> Vec<Book> {
        self.books.items()
    }

    pub fn watch_books(&self) -> watch::Receiver<Vec<Book>> {
        self.books.watch()
    }

    pub fn book(&self, book_id: &str) -> Option<Book> {
        self.books.items().into_iter().find(|b| b.id == book_id)
    }

    /// Show one book's answers, replacing any previously open book.
    pub async fn open_book(&mut self, book_id: &str) -> Result<(), SyncError> {
        let query = Query::filtered(
            self.session()?.collections.answers().clone(),
            Filter::equals(BOOK_ID_FIELD, book_id),
        );
        self.open_book = Some(book_id.to_string());
        let owned = book_id.to_string();
        self.answers
            .subscribe(self.store.as_ref(), query, self.events_tx.clone(), move |answers| {
                SyncEvent::AnswersChanged {
                    book_id: owned.clone(),
                    answers,
                }
            })
            .await
    }

    pub fn close_book(&mut self) {
        self.answers.cancel();
        self.open_book = None;
    }

    pub fn open_book_id(&self) -> Option<&str> {
        self.open_book.as_deref()
    }

    pub fn answers(&self) -> Vec<Answer> {
        self.answers.items()
    }

    pub fn is_live(&self, scope: ProjectionScope) -> bool {
        match scope {
            ProjectionScope::Books => self.books.is_active(),
            ProjectionScope::Answers => self.answers.is_active(),
        }
    }

    /// Fold a delivered event into session state. Front ends call this for
    /// every event they receive.
    pub fn observe(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::BooksChanged(books) => {
                self.selection.seed_from(books);
                self.selection.retain_existing(books);
                let open_deleted = self
                    .open_book
                    .as_ref()
                    .map(|open| !books.iter().any(|b| &b.id == open))
                    .unwrap_or(false);
                if open_deleted {
                    info!(book_id = ?self.open_book, "Open book was deleted");
                    self.close_book();
                }
            }
            SyncEvent::SubscriptionFailed { scope, message } => {
                warn!(scope = %scope, message = %message, "Projection stopped");
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn mutations(&self) -> Result<&Mutations, SyncError> {
        Ok(&self.session()?.mutations)
    }

    pub async fn create_book(&self, name: &str) -> Result<String, SyncError> {
        self.mutations()?.create_book(name).await
    }

    pub async fn rename_book(&self, book_id: &str, name: &str) -> Result<(), SyncError> {
        self.mutations()?.rename_book(book_id, name).await
    }

    pub async fn delete_book(&mut self, book_id: &str) -> Result<usize, SyncError> {
        let removed = self.mutations()?.delete_book(book_id).await?;
        if self.open_book.as_deref() == Some(book_id) {
            self.close_book();
        }
        if self.selection.contains(book_id) {
            self.selection.toggle(book_id);
        }
        Ok(removed)
    }

    pub async fn add_answer(&self, book_id: &str, text: &str) -> Result<String, SyncError> {
        self.mutations()?.add_answer(book_id, text).await
    }

    pub async fn add_answers(&self, book_id: &str, text: &str) -> Result<usize, SyncError> {
        self.mutations()?.add_answers(book_id, text).await
    }

    pub async fn edit_answer(&self, answer_id: &str, text: &str) -> Result<(), SyncError> {
        self.mutations()?.edit_answer(answer_id, text).await
    }

    pub async fn delete_answer(&self, answer_id: &str) -> Result<(), SyncError> {
        self.mutations()?.delete_answer(answer_id).await
    }

    // ------------------------------------------------------------------
    // Selection and draws
    // ------------------------------------------------------------------

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionSet {
        &mut self.selection
    }

    /// Draw from the selected books.
    pub async fn draw(&mut self) -> Result<Option<String>, SyncError> {
        let books = self.books.items();
        self.selection.seed_from(&books);
        let session = self.session()?;
        session.draw.resolve(&self.selection).await
    }

    /// Draw from one book, or from the default/first book when none given.
    pub async fn draw_single(&self, book_id: Option<&str>) -> Result<Option<String>, SyncError> {
        let session = self.session()?;
        session.draw.resolve_single(book_id, &self.books.items()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryIdentityProvider;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn app(store: &MemoryStore, provider: &MemoryIdentityProvider) -> (AnswerBookApp, mpsc::UnboundedReceiver<SyncEvent>) {
        AnswerBookApp::new("app", Locale::En, Arc::new(store.clone()), Arc::new(provider.clone()))
    }

    async fn books_event(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> Vec<Book> {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out")
                .expect("closed");
            if let SyncEvent::BooksChanged(books) = event {
                return books;
            }
        }
    }

    #[tokio::test]
    async fn test_start_signs_in_anonymously_and_bootstraps() {
        let store = MemoryStore::new();
        let provider = MemoryIdentityProvider::new();
        let (mut app, mut rx) = app(&store, &provider);

        app.start().await.unwrap();
        assert!(app.identity().unwrap().is_anonymous);
        assert_eq!(provider.sign_in_count(), 1);

        let books = books_event(&mut rx).await;
        assert_eq!(books.len(), 1);
        assert!(books[0].is_default);
        app.observe(&SyncEvent::BooksChanged(books));
        assert_eq!(app.selection().ids(), ["default".to_string()]);
        assert!(app.is_live(ProjectionScope::Books));
    }

    #[tokio::test]
    async fn test_same_identity_is_noop() {
        let store = MemoryStore::new();
        let provider = MemoryIdentityProvider::new();
        let (mut app, _rx) = app(&store, &provider);
        let identity = provider.sign_in_anonymously().await.unwrap();

        app.handle_identity_change(Some(identity.clone())).await.unwrap();
        let queries = store.query_count();
        app.handle_identity_change(Some(identity)).await.unwrap();
        assert_eq!(store.query_count(), queries);
        assert_eq!(store.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_switching_user_tears_down() {
        let store = MemoryStore::new();
        let provider = MemoryIdentityProvider::new();
        let (mut app, _rx) = app(&store, &provider);
        let first = provider.sign_in_anonymously().await.unwrap();
        app.handle_identity_change(Some(first)).await.unwrap();
        app.open_book("default").await.unwrap();
        assert_eq!(store.listener_count(), 2);

        let second = provider.register("reader@example.com", "secret1").await.unwrap();
        app.handle_identity_change(Some(second.clone())).await.unwrap();
        assert_eq!(app.identity(), Some(&second));
        assert!(app.open_book_id().is_none());
        assert_eq!(store.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_mutations_require_session() {
        let store = MemoryStore::new();
        let provider = MemoryIdentityProvider::new();
        let (mut app, _rx) = app(&store, &provider);
        assert!(matches!(app.create_book("x").await, Err(SyncError::NoSession)));
        assert!(matches!(app.draw().await, Err(SyncError::NoSession)));
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_an_event() {
        let store = MemoryStore::new();
        let provider = MemoryIdentityProvider::new();
        let (mut app, mut rx) = app(&store, &provider);
        store.fail_next_commits(1);

        app.start().await.unwrap();
        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SyncEvent::BootstrapFailed(_)) {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
        assert!(app.is_live(ProjectionScope::Books));

        // A locale switch re-runs the check and repairs it
        let outcome = app.set_locale(Locale::Zh).await;
        assert!(matches!(outcome, Some(BootstrapOutcome::Created { .. })));
    }
}
