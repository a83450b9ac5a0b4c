use std::fmt;

use crate::auth::Identity;
use crate::models::{Answer, Book};

/// Which live projection an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionScope {
    Books,
    Answers,
}

impl fmt::Display for ProjectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionScope::Books => f.write_str("books"),
            ProjectionScope::Answers => f.write_str("answers"),
        }
    }
}

/// Change notifications sent from the session to the front end.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The signed-in identity changed; `None` while signed out
    SessionChanged(Option<Identity>),
    /// Full replacement of the book list
    BooksChanged(Vec<Book>),
    /// Full replacement of the open book's answers
    AnswersChanged { book_id: String, answers: Vec<Answer> },
    /// A live projection stopped after a stream error; re-subscribe to recover
    SubscriptionFailed { scope: ProjectionScope, message: String },
    /// The default book could not be checked or created
    BootstrapFailed(String),
}
