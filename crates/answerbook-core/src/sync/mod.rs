//! Synchronization between the remote collections and the session.
//!
//! - `Projection`: live mirror of one query, replaced wholesale per snapshot
//! - `Mutations`: validated book/answer writes
//! - `DefaultBookBootstrapper`: at-most-once default book creation
//! - `SelectionSet` / `AnswerDraw`: which books to draw from, and the draw

mod bootstrap;
mod error;
mod events;
mod mutations;
mod projection;
mod scope;
mod selection;

pub use bootstrap::{BootstrapOutcome, DefaultBookBootstrapper};
pub use error::{BootstrapError, SyncError, ValidationError};
pub use events::{ProjectionScope, SyncEvent};
pub use mutations::Mutations;
pub use projection::Projection;
pub use scope::UserCollections;
pub use selection::{fallback_book, pick_uniform, AnswerDraw, SelectionSet};
