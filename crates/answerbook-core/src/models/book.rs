use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::locale::Locale;
use crate::store::Fields;

pub const NAME_FIELD: &str = "name";
pub const IS_DEFAULT_FIELD: &str = "isDefault";
const OWNER_FIELD: &str = "userId";

/// Document id of the bootstrapped default book. One per user collection.
pub const DEFAULT_BOOK_ID: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    #[serde(rename = "userId", default)]
    pub owner_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    /// Server timestamp; absent until the store resolves it.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Book {
    /// Fields for a user-created book. `isDefault` is never written here.
    pub fn new_fields(owner_id: &str, name: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert(OWNER_FIELD.to_string(), Value::from(owner_id));
        fields.insert(NAME_FIELD.to_string(), Value::from(name));
        fields
    }

    /// Fields for the bootstrapped default book.
    pub fn default_fields(owner_id: &str, locale: Locale) -> Fields {
        let mut fields = Self::new_fields(owner_id, locale.default_book_name());
        fields.insert(IS_DEFAULT_FIELD.to_string(), Value::Bool(true));
        fields
    }

    /// Field map for a rename; touches only `name`.
    pub fn rename_fields(name: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert(NAME_FIELD.to_string(), Value::from(name));
        fields
    }

    /// Name shown to the user. The default book always shows the localized
    /// default name, whatever it was created with.
    pub fn display_name(&self, locale: Locale) -> &str {
        if self.is_default {
            locale.default_book_name()
        } else {
            &self.name
        }
    }
}
