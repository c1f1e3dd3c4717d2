use std::collections::BTreeMap;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::api::{Book, BookId, BookWithId};
use crate::books_repository::{BookRepository, BookRepositoryError};

/// Same length as the ids Firestore assigns to new documents
const GENERATED_ID_LENGTH: usize = 20;

#[derive(Default)]
pub struct InMemoryBookRepository {
    books: parking_lot::RwLock<BTreeMap<BookId, Book>>,
}

fn generate_book_id() -> BookId {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LENGTH)
        .map(char::from)
        .collect()
}

#[async_trait::async_trait]
impl BookRepository for InMemoryBookRepository {
    async fn list_books(&self) -> Result<Vec<BookWithId>, BookRepositoryError> {
        Ok(self
            .books
            .read()
            .iter()
            .map(|(book_id, book)| BookWithId::new(book_id.clone(), book.clone()))
            .collect())
    }

    async fn get_book(&self, book_id: &str) -> Result<Book, BookRepositoryError> {
        self.books
            .read()
            .get(book_id)
            .cloned()
            .ok_or_else(|| BookRepositoryError::NotFound(book_id.to_string()))
    }

    async fn add_book(&self, book: Book) -> Result<BookId, BookRepositoryError> {
        let mut locked_books = self.books.write();
        let mut id = generate_book_id();
        while locked_books.contains_key(&id) {
            id = generate_book_id();
        }
        locked_books.insert(id.clone(), book);
        Ok(id)
    }

    async fn set_book(&self, book_id: &str, book: Book) -> Result<(), BookRepositoryError> {
        self.books.write().insert(book_id.to_string(), book);
        Ok(())
    }

    async fn delete_book(&self, book_id: &str) -> Result<(), BookRepositoryError> {
        self.books.write().remove(book_id);
        Ok(())
    }
}
