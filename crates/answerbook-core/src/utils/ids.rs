use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of generated document ids, same as the Firestore SDK auto ids.
const DOCUMENT_ID_LENGTH: usize = 20;

/// Generate a random document id for client-side creates.
pub fn new_document_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DOCUMENT_ID_LENGTH)
        .map(char::from)
        .collect()
}
