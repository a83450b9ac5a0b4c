use crate::store::{Collection, CollectionPath};

/// The two collections of one signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCollections {
    user_id: String,
    books: CollectionPath,
    answers: CollectionPath,
}

impl UserCollections {
    pub fn new(app_id: &str, user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            books: CollectionPath::new(app_id, user_id, Collection::Books),
            answers: CollectionPath::new(app_id, user_id, Collection::Answers),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn books(&self) -> &CollectionPath {
        &self.books
    }

    pub fn answers(&self) -> &CollectionPath {
        &self.answers
    }
}
