use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{default_added, Book};
use crate::books_repository::BookRepositoryError;

// Field names already present in the books collection
const TITLE_FIELD: &str = "Title";
const AUTHOR_FIELD: &str = "Author";
const YEAR_FIELD: &str = "Year";
const ADDED_FIELD: &str = "Added";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Typed value as Firestore REST api encodes it, e.g. `{"stringValue": "x"}`
pub enum FirestoreValue {
    NullValue(()),
    BooleanValue(bool),
    /// int64 is transported as a json string
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(DateTime<Utc>),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(serde_json::Value),
    ArrayValue(serde_json::Value),
    MapValue(serde_json::Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirestoreDocument {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FirestoreValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Vec<FirestoreDocument>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

fn type_mismatch(field: &str, value: &FirestoreValue) -> BookRepositoryError {
    BookRepositoryError::DeserializationError(serde::de::Error::custom(format!(
        "field {} has unexpected value {:?}",
        field, value
    )))
}

impl FirestoreDocument {
    pub fn from_book(book: &Book) -> Self {
        let fields = BTreeMap::from([
            (
                TITLE_FIELD.to_string(),
                FirestoreValue::StringValue(book.title.clone()),
            ),
            (
                AUTHOR_FIELD.to_string(),
                FirestoreValue::StringValue(book.author.clone()),
            ),
            (
                YEAR_FIELD.to_string(),
                FirestoreValue::StringValue(book.year.clone()),
            ),
            (
                ADDED_FIELD.to_string(),
                FirestoreValue::TimestampValue(book.added),
            ),
        ]);
        Self {
            name: String::new(),
            fields,
        }
    }

    /// Last segment of the document name, i.e. id within its collection
    pub fn id(&self) -> Option<&str> {
        self.name.rsplit('/').next().filter(|id| !id.is_empty())
    }

    fn string_field(&self, field: &str) -> Result<String, BookRepositoryError> {
        match self.fields.get(field) {
            None | Some(FirestoreValue::NullValue(())) => Ok(String::new()),
            Some(FirestoreValue::StringValue(value)) => Ok(value.clone()),
            Some(other) => Err(type_mismatch(field, other)),
        }
    }

    fn timestamp_field(&self, field: &str) -> Result<DateTime<Utc>, BookRepositoryError> {
        match self.fields.get(field) {
            None | Some(FirestoreValue::NullValue(())) => Ok(default_added()),
            Some(FirestoreValue::TimestampValue(value)) => Ok(*value),
            Some(other) => Err(type_mismatch(field, other)),
        }
    }

    pub fn to_book(&self) -> Result<Book, BookRepositoryError> {
        Ok(Book {
            title: self.string_field(TITLE_FIELD)?,
            author: self.string_field(AUTHOR_FIELD)?,
            year: self.string_field(YEAR_FIELD)?,
            added: self.timestamp_field(ADDED_FIELD)?,
        })
    }
}
