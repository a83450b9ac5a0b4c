use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Fields;

pub const BOOK_ID_FIELD: &str = "bookId";
pub const TEXT_FIELD: &str = "text";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: String,
    pub book_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Answer {
    pub fn new_fields(book_id: &str, text: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert(BOOK_ID_FIELD.to_string(), Value::from(book_id));
        fields.insert(TEXT_FIELD.to_string(), Value::from(text));
        fields
    }

    pub fn edit_fields(text: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert(TEXT_FIELD.to_string(), Value::from(text));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Document;
    use serde_json::json;

    #[test]
    fn test_decode_answer_document() {
        let fields = json!({"bookId": "b1", "text": "Without a doubt.", "createdAt": null});
        let doc = Document::new("a1", fields.as_object().cloned().unwrap());
        let answer: Answer = doc.decode().unwrap();
        assert_eq!(answer.id, "a1");
        assert_eq!(answer.book_id, "b1");
        assert_eq!(answer.text, "Without a doubt.");
        assert!(answer.created_at.is_none());
    }

    #[test]
    fn test_answer_requires_book_id() {
        let doc = Document::new("a1", json!({"text": "orphan"}).as_object().cloned().unwrap());
        assert!(doc.decode::<Answer>().is_err());
    }
}
