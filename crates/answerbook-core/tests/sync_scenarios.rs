use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use answerbook_core::auth::{IdentityProvider, MemoryIdentityProvider};
use answerbook_core::models::{Answer, BOOK_ID_FIELD};
use answerbook_core::store::{DocumentStore, Filter, MemoryStore, Query};
use answerbook_core::sync::{
    AnswerDraw, BootstrapOutcome, DefaultBookBootstrapper, Mutations, SelectionSet, SyncEvent, UserCollections,
};
use answerbook_core::{AnswerBookApp, Locale};
use tokio::sync::mpsc;

fn collections() -> UserCollections {
    UserCollections::new("my-answer-book-app", "user-1")
}

async fn orphan_count(store: &MemoryStore, collections: &UserCollections, book_id: &str) -> usize {
    let query = Query::filtered(collections.answers().clone(), Filter::equals(BOOK_ID_FIELD, book_id));
    store.query(&query).await.unwrap().len()
}

#[tokio::test]
async fn cascade_delete_removes_book_and_all_answers() {
    let store = MemoryStore::new();
    let collections = collections();
    let mutations = Mutations::new(Arc::new(store.clone()), collections.clone());

    let book_id = mutations.create_book("Travel").await.unwrap();
    let k = mutations
        .add_answers(&book_id, "Go north.\nStay home.\nAsk again tomorrow.\nTake the train.")
        .await
        .unwrap();
    let other = mutations.create_book("Other").await.unwrap();
    mutations.add_answer(&other, "Unrelated").await.unwrap();

    let before = store.document_count();
    mutations.delete_book(&book_id).await.unwrap();

    assert_eq!(store.document_count(), before - (k + 1));
    assert_eq!(orphan_count(&store, &collections, &book_id).await, 0);
    assert_eq!(orphan_count(&store, &collections, &other).await, 1);
}

#[tokio::test]
async fn bootstrap_twice_yields_one_default_book() {
    let store = MemoryStore::new();
    let collections = collections();
    let bootstrapper = DefaultBookBootstrapper::new();

    for _ in 0..2 {
        bootstrapper
            .ensure_default_book(&store, &collections, Locale::Zh)
            .await
            .unwrap();
    }

    let defaults = store
        .query(&Query::filtered(collections.books().clone(), Filter::equals("isDefault", true)))
        .await
        .unwrap();
    assert_eq!(defaults.len(), 1);
    assert_eq!(store.len(collections.answers()), Locale::Zh.seed_answers().len());
}

#[tokio::test]
async fn concurrent_bootstraps_from_two_devices_do_not_duplicate() {
    let store = MemoryStore::new();
    let collections = collections();
    // Separate bootstrappers stand in for two devices
    let device_a = DefaultBookBootstrapper::new();
    let device_b = DefaultBookBootstrapper::new();

    let (a, b) = tokio::join!(
        device_a.ensure_default_book(&store, &collections, Locale::En),
        device_b.ensure_default_book(&store, &collections, Locale::En),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, BootstrapOutcome::Created { .. }))
            .count(),
        1
    );
    assert_eq!(store.len(collections.books()), 1);
    assert_eq!(store.len(collections.answers()), Locale::En.seed_answers().len());
}

#[tokio::test]
async fn selection_draws_cover_every_answer() {
    let store = MemoryStore::new();
    let collections = collections();
    let mutations = Mutations::new(Arc::new(store.clone()), collections.clone());
    let b1 = mutations.create_book("B1").await.unwrap();
    let b2 = mutations.create_book("B2").await.unwrap();
    let empty = mutations.create_book("Empty").await.unwrap();
    mutations.add_answer(&b1, "x").await.unwrap();
    mutations.add_answers(&b2, "y\nz").await.unwrap();

    let draw = AnswerDraw::new(Arc::new(store.clone()), collections);
    let mut selection = SelectionSet::new();
    selection.set([b1.clone(), b2.clone()]);

    let mut seen = HashSet::new();
    for _ in 0..300 {
        seen.insert(draw.resolve(&selection).await.unwrap().unwrap());
    }
    let expected: HashSet<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
    assert_eq!(seen, expected);

    assert!(draw.resolve(&SelectionSet::new()).await.unwrap().is_none());
    selection.set([empty.clone()]);
    assert!(draw.resolve(&selection).await.unwrap().is_none());
    assert!(draw.resolve_single(Some(&empty), &[]).await.unwrap().is_none());
    assert_eq!(draw.resolve_single(Some(&b1), &[]).await.unwrap().as_deref(), Some("x"));
}

async fn drain(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
    // Let projection tasks deliver whatever is pending
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn answer_events_for<'a>(events: &'a [SyncEvent], book: &str) -> Vec<&'a Vec<Answer>> {
    events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::AnswersChanged { book_id, answers } if book_id == book => Some(answers),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn switching_open_book_stops_old_notifications() {
    let store = MemoryStore::new();
    let provider = MemoryIdentityProvider::new();
    let (mut app, mut rx) = AnswerBookApp::new(
        "my-answer-book-app",
        Locale::En,
        Arc::new(store.clone()),
        Arc::new(provider.clone()),
    );
    app.start().await.unwrap();

    let book_a = app.create_book("A").await.unwrap();
    let book_b = app.create_book("B").await.unwrap();
    app.open_book(&book_a).await.unwrap();
    app.add_answer(&book_a, "first A").await.unwrap();
    let events = drain(&mut rx).await;
    assert!(!answer_events_for(&events, &book_a).is_empty());

    app.open_book(&book_b).await.unwrap();
    app.add_answer(&book_a, "second A").await.unwrap();
    app.add_answer(&book_b, "first B").await.unwrap();
    let events = drain(&mut rx).await;

    assert!(answer_events_for(&events, &book_a).is_empty());
    let b_events = answer_events_for(&events, &book_b);
    assert_eq!(b_events.last().unwrap()[0].text, "first B");
    assert_eq!(app.answers().len(), 1);
    assert_eq!(app.open_book_id(), Some(book_b.as_str()));
}

#[tokio::test]
async fn deleting_open_book_closes_it() {
    let store = MemoryStore::new();
    let provider = MemoryIdentityProvider::new();
    let (mut app, mut rx) = AnswerBookApp::new("app", Locale::En, Arc::new(store.clone()), Arc::new(provider));
    app.start().await.unwrap();

    let book = app.create_book("Short lived").await.unwrap();
    app.add_answers(&book, "one\ntwo").await.unwrap();
    app.open_book(&book).await.unwrap();
    app.selection_mut().select(&book);

    assert_eq!(app.delete_book(&book).await.unwrap(), 2);
    assert!(app.open_book_id().is_none());
    assert!(!app.selection().contains(&book));

    for event in drain(&mut rx).await {
        app.observe(&event);
    }
    assert!(app.books().iter().all(|b| b.id != book));
}

#[tokio::test]
async fn sign_out_then_anonymous_session_gets_its_own_default_book() {
    let store = MemoryStore::new();
    let provider = MemoryIdentityProvider::new();
    let (mut app, _rx) = AnswerBookApp::new("app", Locale::En, Arc::new(store.clone()), Arc::new(provider.clone()));

    let member = provider.register("reader@example.com", "secret1").await.unwrap();
    app.handle_identity_change(Some(member.clone())).await.unwrap();
    provider.sign_out().await.unwrap();
    app.handle_identity_change(None).await.unwrap();

    let anonymous = app.identity().unwrap().clone();
    assert!(anonymous.is_anonymous);
    assert_ne!(anonymous.user_id, member.user_id);
    // One default book per user
    assert_eq!(store.len(UserCollections::new("app", &member.user_id).books()), 1);
    assert_eq!(store.len(UserCollections::new("app", &anonymous.user_id).books()), 1);
}
