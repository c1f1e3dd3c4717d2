use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Deserializer, Serialize};

pub type BookId = String;

pub const BOOK_DELETED_MESSAGE: &str = "Book deleted successfully";

/// Timestamp of a book stored without one, `0001-01-01T00:00:00Z`
pub fn default_added() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or_default()
}

// null is treated the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default_added<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<DateTime<Utc>>::deserialize(deserializer)?.unwrap_or_else(default_added))
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(default)]
/// Payload of a create request, the timestamp is always assigned by the service
pub struct BookDetails {
    #[serde(alias = "Title", deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(alias = "Author", deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(alias = "Year", deserialize_with = "null_as_default")]
    pub year: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(default)]
/// Book as it is stored in the database
pub struct Book {
    #[serde(alias = "Title", deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(alias = "Author", deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(alias = "Year", deserialize_with = "null_as_default")]
    pub year: String,
    #[serde(alias = "Added", deserialize_with = "null_as_default_added")]
    pub added: DateTime<Utc>,
}

impl Default for Book {
    fn default() -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            year: String::new(),
            added: default_added(),
        }
    }
}

impl Book {
    pub fn from_details(details: BookDetails, added: DateTime<Utc>) -> Self {
        Self {
            title: details.title,
            author: details.author,
            year: details.year,
            added,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Book together with the id assigned by the database
pub struct BookWithId {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub year: String,
    pub added: DateTime<Utc>,
}

impl BookWithId {
    pub fn new(id: BookId, book: Book) -> Self {
        Self {
            id,
            title: book.title,
            author: book.author,
            year: book.year,
            added: book.added,
        }
    }

    pub fn into_book(self) -> (BookId, Book) {
        (
            self.id,
            Book {
                title: self.title,
                author: self.author,
                year: self.year,
                added: self.added,
            },
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct DeleteBookResponse {
    pub message: String,
}

impl Default for DeleteBookResponse {
    fn default() -> Self {
        Self {
            message: BOOK_DELETED_MESSAGE.to_string(),
        }
    }
}
