//! Data models for Answer Book documents.
//!
//! - `Book`: a named collection of answers owned by one user
//! - `Answer`: a single text item referencing its book by id
//!
//! Models deserialize straight from store documents (camelCase fields) and
//! build the field maps written back to the store.

pub mod answer;
pub mod book;

pub use answer::{Answer, BOOK_ID_FIELD, TEXT_FIELD};
pub use book::{Book, DEFAULT_BOOK_ID, IS_DEFAULT_FIELD, NAME_FIELD};
