use reqwest::{Response, StatusCode, Url};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};

use crate::api::{Book, BookId, BookWithId};
use crate::books_repository::firestore_document::{FirestoreDocument, ListDocumentsResponse};
use crate::books_repository::{read_json, BookRepository, BookRepositoryError};
use crate::firebase_auth::FirebaseAuth;

const FIRESTORE_URL: &str = "https://firestore.googleapis.com";
/// Token accepted by the emulator as an admin token
const EMULATOR_OWNER_TOKEN: &str = "owner";

pub struct FirestoreBooksRepositoryConfig {
    pub project_id: String,
    pub collection: String,
    /// `host:port` of a local Firestore emulator
    pub emulator_host: Option<String>,
    pub page_size: u32,
}

pub struct FirestoreBooksRepository {
    client: ClientWithMiddleware,
    auth: FirebaseAuth,
    collection_url: Url,
    page_size: u32,
}

#[derive(serde::Deserialize)]
struct FirestoreErrorBody {
    error: FirestoreErrorDetails,
}

#[derive(serde::Deserialize)]
struct FirestoreErrorDetails {
    message: String,
}

impl FirestoreBooksRepository {
    pub fn init(
        config: FirestoreBooksRepositoryConfig,
        auth: FirebaseAuth,
        client: ClientWithMiddleware,
    ) -> Result<Self, BookRepositoryError> {
        let base_url = match &config.emulator_host {
            Some(host) => format!("http://{}", host),
            None => FIRESTORE_URL.to_string(),
        };
        let collection_url = Url::parse(&format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            base_url, config.project_id, config.collection
        ))
        .map_err(|err| BookRepositoryError::Other(format!("Invalid Firestore url: {}", err)))?;
        tracing::info!("Firestore collection url: {}", collection_url);

        Ok(Self {
            client,
            auth,
            collection_url,
            page_size: config.page_size,
        })
    }

    fn document_url(&self, book_id: &str) -> Result<Url, BookRepositoryError> {
        let mut url = self.collection_url.clone();
        url.path_segments_mut()
            .map_err(|_| BookRepositoryError::Other("Firestore url cannot be a base".to_string()))?
            .push(book_id);
        Ok(url)
    }

    /// Authorizes and sends the request, non-success statuses are turned into errors
    async fn send(&self, request: RequestBuilder) -> Result<Response, BookRepositoryError> {
        let token = self
            .auth
            .access_token()
            .await?
            .unwrap_or_else(|| EMULATOR_OWNER_TOKEN.to_string());
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<FirestoreErrorBody>(&body)
            .map(|error_body| error_body.error.message)
            .unwrap_or(body);
        Err(BookRepositoryError::DatabaseFailure { status, message })
    }

    fn document_id(document: &FirestoreDocument) -> Result<BookId, BookRepositoryError> {
        document.id().map(str::to_string).ok_or_else(|| {
            BookRepositoryError::Other(format!("Invalid document name '{}'", document.name))
        })
    }
}

#[async_trait::async_trait]
impl BookRepository for FirestoreBooksRepository {
    async fn list_books(&self) -> Result<Vec<BookWithId>, BookRepositoryError> {
        let mut books = vec![];
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.collection_url.clone())
                .query(&[("pageSize", self.page_size.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: ListDocumentsResponse = read_json(self.send(request).await?).await?;
            tracing::debug!("Fetched page of {} documents", page.documents.len());

            for document in page.documents {
                books.push(BookWithId::new(
                    Self::document_id(&document)?,
                    document.to_book()?,
                ));
            }

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(books)
    }

    async fn get_book(&self, book_id: &str) -> Result<Book, BookRepositoryError> {
        let request = self.client.get(self.document_url(book_id)?);
        let response = match self.send(request).await {
            Err(BookRepositoryError::DatabaseFailure {
                status: StatusCode::NOT_FOUND,
                ..
            }) => return Err(BookRepositoryError::NotFound(book_id.to_string())),
            result => result?,
        };
        let document: FirestoreDocument = read_json(response).await?;
        document.to_book()
    }

    async fn add_book(&self, book: Book) -> Result<BookId, BookRepositoryError> {
        let request = self
            .client
            .post(self.collection_url.clone())
            .json(&FirestoreDocument::from_book(&book));
        let created: FirestoreDocument = read_json(self.send(request).await?).await?;
        let book_id = Self::document_id(&created)?;
        tracing::info!("Created Firestore document {}", book_id);
        Ok(book_id)
    }

    async fn set_book(&self, book_id: &str, book: Book) -> Result<(), BookRepositoryError> {
        // Without update mask the whole document is replaced or created
        let request = self
            .client
            .patch(self.document_url(book_id)?)
            .json(&FirestoreDocument::from_book(&book));
        self.send(request).await?;
        Ok(())
    }

    async fn delete_book(&self, book_id: &str) -> Result<(), BookRepositoryError> {
        let request = self.client.delete(self.document_url(book_id)?);
        self.send(request).await?;
        Ok(())
    }
}
