use std::fmt::Display;
use std::sync::Arc;

use actix_web::http::header::{ContentType, LOCATION};
use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use chrono::{SubsecRound, Utc};
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{Book, BookDetails, BookId, BookWithId, DeleteBookResponse};
use crate::books_repository::{BookRepository, BookRepositoryError};

const PARSE_FAILURE_CONTEXT: &str = "Failed to parse document data";

/// Plain text error the way every failure is reported to the caller
fn internal_error(context: &str, err: impl Display) -> HttpResponse {
    HttpResponse::InternalServerError()
        .content_type(ContentType::plaintext())
        .body(format!("{}: {}", context, err))
}

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

#[api_v2_operation]
pub async fn get_all_books(
    books_repository: Data<Arc<dyn BookRepository>>,
) -> Result<HttpResponse, Error> {
    Ok(match books_repository.list_books().await {
        Ok(books) => HttpResponse::Ok().json(books),
        Err(err) => {
            tracing::error!("Get all books failed {}", err);
            let context = if err.is_parse_failure() {
                PARSE_FAILURE_CONTEXT
            } else {
                "Failed to iterate document"
            };
            internal_error(context, err)
        }
    })
}

#[api_v2_operation]
pub async fn get_book(
    books_repository: Data<Arc<dyn BookRepository>>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let book_id = book_id.into_inner();
    Ok(match books_repository.get_book(&book_id).await {
        Ok(book) => HttpResponse::Ok().json(BookWithId::new(book_id, book)),
        Err(BookRepositoryError::NotFound(_)) => HttpResponse::NotFound()
            .content_type(ContentType::plaintext())
            .body("Book not found"),
        Err(err) if err.is_parse_failure() => {
            tracing::error!("Get book {} failed {}", book_id, err);
            internal_error(PARSE_FAILURE_CONTEXT, err)
        }
        Err(err) => {
            tracing::error!("Get book {} failed {}", book_id, err);
            internal_error("Failed to retrieve book", err)
        }
    })
}

#[api_v2_operation]
pub async fn add_book(
    books_repository: Data<Arc<dyn BookRepository>>,
    details: web::Json<BookDetails>,
) -> Result<HttpResponse, Error> {
    // Firestore keeps timestamps with microsecond precision
    let book = Book::from_details(details.into_inner(), Utc::now().trunc_subsecs(6));
    Ok(match books_repository.add_book(book.clone()).await {
        Ok(book_id) => {
            tracing::info!("Added book {}", book_id);
            HttpResponse::Created()
                .append_header((LOCATION, format!("/api/books/{}", book_id)))
                .json(BookWithId::new(book_id, book))
        }
        Err(err) => {
            tracing::error!("Add book failed {}", err);
            internal_error("Failed to create book", err)
        }
    })
}

#[api_v2_operation]
pub async fn update_book(
    books_repository: Data<Arc<dyn BookRepository>>,
    book_id: web::Path<BookId>,
    book: web::Json<Book>,
) -> Result<HttpResponse, Error> {
    let book_id = book_id.into_inner();
    let book = book.into_inner();
    Ok(
        match books_repository.set_book(&book_id, book.clone()).await {
            Ok(()) => HttpResponse::Ok().json(BookWithId::new(book_id, book)),
            Err(err) => {
                tracing::error!("Update book {} failed {}", book_id, err);
                internal_error("Failed to update book", err)
            }
        },
    )
}

#[api_v2_operation]
pub async fn delete_book(
    books_repository: Data<Arc<dyn BookRepository>>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let book_id = book_id.into_inner();
    Ok(match books_repository.delete_book(&book_id).await {
        Ok(()) => HttpResponse::Ok().json(DeleteBookResponse::default()),
        Err(err) => {
            tracing::error!("Delete book {} failed {}", book_id, err);
            internal_error("Failed to delete book", err)
        }
    })
}
