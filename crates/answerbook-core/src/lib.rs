//! Core library for Answer Book.
//!
//! Answer Book draws a random answer from one or more user-owned books that
//! live in a remote document store. This crate holds everything except the
//! presentation layer:
//!
//! - `assets`: the versioned offline cache for static assets and the
//!   request interceptor that decides cache vs. network
//! - `store`: the document store contract plus in-memory and Firestore REST
//!   implementations, with cancellable subscriptions
//! - `sync`: snapshot projections, mutations, default book bootstrap and
//!   answer selection
//! - `auth`: identity provider contract, Firebase Auth REST adapter and
//!   on-disk session persistence
//! - `app`: the per-session context tying the pieces together

pub mod app;
pub mod assets;
pub mod auth;
pub mod config;
pub mod locale;
pub mod models;
pub mod store;
pub mod sync;
pub mod utils;

pub use app::AnswerBookApp;
pub use config::{Config, ConfigError, RemoteConfig};
pub use locale::Locale;
