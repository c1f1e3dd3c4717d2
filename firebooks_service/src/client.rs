use anyhow::{bail, Context};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;

use crate::api::{Book, BookDetails, BookWithId, DeleteBookResponse};
use crate::http_client::build_http_client;

pub struct BooksApiClient {
    url: String,
    client: ClientWithMiddleware,
}

impl BooksApiClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client: build_http_client()?,
        })
    }

    async fn error_text(response: reqwest::Response) -> String {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        format!("{} {}", status, text)
    }

    /// Calls GET /api/books endpoint
    pub async fn list_books(&self) -> anyhow::Result<Vec<BookWithId>> {
        let response = self
            .client
            .get(format!("{}/api/books", self.url))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            bail!("Failed to list books {}", Self::error_text(response).await)
        }
    }

    /// Calls GET /api/books/{id} endpoint
    /// Returns None if the book does not exist
    pub async fn get_book(&self, book_id: &str) -> anyhow::Result<Option<BookWithId>> {
        let response = self
            .client
            .get(format!("{}/api/books/{}", self.url, book_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            bail!("Failed to get book {}", Self::error_text(response).await)
        }
    }

    /// Calls POST /api/books endpoint
    /// Returns created book with its id and timestamp
    pub async fn add_book(&self, book_details: BookDetails) -> anyhow::Result<BookWithId> {
        let response = self
            .client
            .post(format!("{}/api/books", self.url))
            .json(&book_details)
            .send()
            .await?;
        if response.status() != StatusCode::CREATED {
            bail!("Failed to add book {}", Self::error_text(response).await)
        }
        response
            .json()
            .await
            .context("Failed to parse created book")
    }

    /// Calls PUT /api/books/{id} endpoint, replacing the whole book
    pub async fn update_book(&self, book_id: &str, book: Book) -> anyhow::Result<BookWithId> {
        let response = self
            .client
            .put(format!("{}/api/books/{}", self.url, book_id))
            .json(&book)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            bail!("Failed to update book {}", Self::error_text(response).await)
        }
    }

    /// Calls DELETE /api/books/{id} endpoint
    pub async fn delete_book(&self, book_id: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .delete(format!("{}/api/books/{}", self.url, book_id))
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to delete book {}", Self::error_text(response).await)
        }
        let _: DeleteBookResponse = response.json().await?;
        Ok(())
    }
}
