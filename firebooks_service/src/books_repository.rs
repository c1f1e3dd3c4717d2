pub use firestore_books_repository::{FirestoreBooksRepository, FirestoreBooksRepositoryConfig};
pub use in_memory_books_repository::InMemoryBookRepository;
pub use realtime_database_books_repository::{
    RealtimeDatabaseBooksRepository, RealtimeDatabaseBooksRepositoryConfig,
};

use std::sync::Arc;

use anyhow::Context;

use crate::api::{Book, BookId, BookWithId};
use crate::firebase_auth::{
    AccessTokenSource, FirebaseAuth, FirebaseAuthError, ServiceAccountKey, DATASTORE_SCOPE,
    FIREBASE_DATABASE_SCOPE, USERINFO_EMAIL_SCOPE,
};
use crate::http_client::build_http_client;
use crate::settings::{DatabaseBackend, DatabaseSettings};

mod firestore_books_repository;
mod firestore_document;
mod in_memory_books_repository;
mod realtime_database_books_repository;

#[derive(thiserror::Error, Debug)]
pub enum BookRepositoryError {
    #[error("Book {0} not found")]
    NotFound(BookId),

    #[error("Failed to deserialize book: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Request failure {0}")]
    RequestFailure(#[from] reqwest_middleware::Error),

    #[error("Response failure {0}")]
    ResponseFailure(#[from] reqwest::Error),

    #[error("Malformed response {0}")]
    MalformedResponse(#[source] serde_json::Error),

    #[error("DatabaseFailure status {status}: {message}")]
    DatabaseFailure {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("Authorization failure {0}")]
    AuthFailure(#[from] FirebaseAuthError),

    #[error("Other error {0}")]
    Other(String),
}

impl BookRepositoryError {
    /// True when the stored data could not be turned into a book
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, BookRepositoryError::DeserializationError(_))
    }
}

#[async_trait::async_trait]
pub trait BookRepository: Send + Sync {
    /// Lists all books in the repository, ordered by id
    async fn list_books(&self) -> Result<Vec<BookWithId>, BookRepositoryError>;
    /// Retrieves the book from repository
    async fn get_book(&self, book_id: &str) -> Result<Book, BookRepositoryError>;
    /// Adds book to repository, returns an id assigned to the book by the database
    async fn add_book(&self, book: Book) -> Result<BookId, BookRepositoryError>;
    /// Replaces the whole book under given id, creates it when it does not exist
    async fn set_book(&self, book_id: &str, book: Book) -> Result<(), BookRepositoryError>;
    /// Deletes the book, deleting a missing book is not an error
    async fn delete_book(&self, book_id: &str) -> Result<(), BookRepositoryError>;
}

/// Decodes the response envelope, a body that is not the expected json is a transport failure.
/// Book fields are decoded separately so their failures stay `DeserializationError`
async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BookRepositoryError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(BookRepositoryError::MalformedResponse)
}

/// Project used with emulators when none is configured, `demo-` projects never reach production
const EMULATOR_DEFAULT_PROJECT_ID: &str = "demo-firebooks";

fn token_scopes(backend: DatabaseBackend) -> &'static [&'static str] {
    match backend {
        DatabaseBackend::Firestore => &[DATASTORE_SCOPE, USERINFO_EMAIL_SCOPE],
        DatabaseBackend::RealtimeDatabase => &[FIREBASE_DATABASE_SCOPE, USERINFO_EMAIL_SCOPE],
        DatabaseBackend::InMemory => &[],
    }
}

/// Opens the database selected in settings
pub fn init_books_repository(
    settings: &DatabaseSettings,
) -> anyhow::Result<Arc<dyn BookRepository>> {
    if settings.backend == DatabaseBackend::InMemory {
        tracing::info!("Using in memory books repository");
        return Ok(Arc::new(InMemoryBookRepository::default()));
    }

    let client = build_http_client()?;
    let emulator_host = settings.emulator_host();
    let (auth, project_id) = match &emulator_host {
        Some(host) => {
            tracing::info!("Using database emulator at {}", host);
            let project_id = settings
                .project_id
                .clone()
                .unwrap_or_else(|| EMULATOR_DEFAULT_PROJECT_ID.to_string());
            (FirebaseAuth::Emulator, project_id)
        }
        None => {
            let key = ServiceAccountKey::from_file(&settings.credentials_file)
                .context("Failed to load service account key")?;
            let project_id = settings
                .project_id
                .clone()
                .unwrap_or_else(|| key.project_id.clone());
            let token_source =
                AccessTokenSource::new(key, token_scopes(settings.backend), client.clone());
            (FirebaseAuth::ServiceAccount(token_source), project_id)
        }
    };

    let repository: Arc<dyn BookRepository> = match settings.backend {
        DatabaseBackend::Firestore => Arc::new(FirestoreBooksRepository::init(
            FirestoreBooksRepositoryConfig {
                project_id,
                collection: settings.collection.clone(),
                emulator_host,
                page_size: settings.page_size,
            },
            auth,
            client,
        )?),
        DatabaseBackend::RealtimeDatabase => {
            let database_url = settings
                .database_url
                .clone()
                .context("database.database_url is required for realtime_database backend")?;
            Arc::new(RealtimeDatabaseBooksRepository::init(
                RealtimeDatabaseBooksRepositoryConfig {
                    database_url,
                    collection: settings.collection.clone(),
                    emulator_host,
                },
                auth,
                client,
            )?)
        }
        DatabaseBackend::InMemory => Arc::new(InMemoryBookRepository::default()),
    };
    Ok(repository)
}
