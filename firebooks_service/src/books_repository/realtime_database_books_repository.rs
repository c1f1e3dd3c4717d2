use std::collections::BTreeMap;

use reqwest::{Response, Url};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use serde::Deserialize;

use crate::api::{Book, BookId, BookWithId};
use crate::books_repository::{read_json, BookRepository, BookRepositoryError};
use crate::firebase_auth::FirebaseAuth;

pub struct RealtimeDatabaseBooksRepositoryConfig {
    /// e.g. `https://my-project-default-rtdb.firebaseio.com`
    pub database_url: String,
    pub collection: String,
    /// `host:port` of a local database emulator
    pub emulator_host: Option<String>,
}

pub struct RealtimeDatabaseBooksRepository {
    client: ClientWithMiddleware,
    auth: FirebaseAuth,
    base_url: Url,
    collection: Vec<String>,
    /// Database name, the emulator needs it as `ns` query parameter
    namespace: Option<String>,
}

#[derive(Deserialize)]
struct PushResponse {
    name: BookId,
}

#[derive(Deserialize)]
struct DatabaseErrorBody {
    error: String,
}

impl RealtimeDatabaseBooksRepository {
    pub fn init(
        config: RealtimeDatabaseBooksRepositoryConfig,
        auth: FirebaseAuth,
        client: ClientWithMiddleware,
    ) -> Result<Self, BookRepositoryError> {
        let invalid_url =
            |err: String| BookRepositoryError::Other(format!("Invalid database url: {}", err));
        let database_url = Url::parse(&config.database_url).map_err(|e| invalid_url(e.to_string()))?;

        let (base_url, namespace) = match &config.emulator_host {
            Some(host) => {
                let namespace = database_url
                    .host_str()
                    .and_then(|host| host.split('.').next())
                    .ok_or_else(|| invalid_url(config.database_url.clone()))?
                    .to_string();
                let emulator_url = Url::parse(&format!("http://{}", host))
                    .map_err(|e| invalid_url(e.to_string()))?;
                (emulator_url, Some(namespace))
            }
            None => (database_url, None),
        };
        if base_url.cannot_be_a_base() {
            return Err(invalid_url(base_url.to_string()));
        }
        tracing::info!(
            "Realtime database url: {} namespace: {:?}",
            base_url,
            namespace
        );

        Ok(Self {
            client,
            auth,
            base_url,
            collection: config
                .collection
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
            namespace,
        })
    }

    /// REST url of the reference, i.e. path with `.json` suffix
    fn reference_url(&self, book_id: Option<&str>) -> Url {
        let mut path: Vec<&str> = self.collection.iter().map(String::as_str).collect();
        if let Some(book_id) = book_id {
            path.push(book_id);
        }
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            if let Some((last, parents)) = path.split_last() {
                segments.extend(parents);
                segments.push(&format!("{}.json", last));
            }
        }
        url
    }

    /// Authorizes and sends the request, non-success statuses are turned into errors
    async fn send(&self, mut request: RequestBuilder) -> Result<Response, BookRepositoryError> {
        if let Some(token) = self.auth.access_token().await? {
            request = request.query(&[("access_token", token)]);
        }
        if let Some(namespace) = &self.namespace {
            request = request.query(&[("ns", namespace)]);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<DatabaseErrorBody>(&body)
            .map(|error_body| error_body.error)
            .unwrap_or(body);
        Err(BookRepositoryError::DatabaseFailure { status, message })
    }
}

#[async_trait::async_trait]
impl BookRepository for RealtimeDatabaseBooksRepository {
    async fn list_books(&self) -> Result<Vec<BookWithId>, BookRepositoryError> {
        let request = self.client.get(self.reference_url(None));
        // Empty reference is returned as null
        let books: Option<BTreeMap<BookId, serde_json::Value>> =
            read_json(self.send(request).await?).await?;

        books
            .unwrap_or_default()
            .into_iter()
            .map(|(book_id, book)| -> Result<BookWithId, BookRepositoryError> {
                let book: Book = serde_json::from_value(book)?;
                Ok(BookWithId::new(book_id, book))
            })
            .collect()
    }

    async fn get_book(&self, book_id: &str) -> Result<Book, BookRepositoryError> {
        let request = self.client.get(self.reference_url(Some(book_id)));
        let book: Option<serde_json::Value> = read_json(self.send(request).await?).await?;
        match book {
            Some(book) => Ok(serde_json::from_value(book)?),
            None => Err(BookRepositoryError::NotFound(book_id.to_string())),
        }
    }

    async fn add_book(&self, book: Book) -> Result<BookId, BookRepositoryError> {
        let request = self.client.post(self.reference_url(None)).json(&book);
        let pushed: PushResponse = read_json(self.send(request).await?).await?;
        tracing::info!("Pushed book {}", pushed.name);
        Ok(pushed.name)
    }

    async fn set_book(&self, book_id: &str, book: Book) -> Result<(), BookRepositoryError> {
        let request = self
            .client
            .put(self.reference_url(Some(book_id)))
            .json(&book);
        self.send(request).await?;
        Ok(())
    }

    async fn delete_book(&self, book_id: &str) -> Result<(), BookRepositoryError> {
        let request = self.client.delete(self.reference_url(Some(book_id)));
        self.send(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod realtime_database_book_repository_tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use actix_web::{web, HttpResponse};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use crate::api::{Book, BookWithId};
    use crate::books_repository::{
        BookRepository, BookRepositoryError, RealtimeDatabaseBooksRepository,
        RealtimeDatabaseBooksRepositoryConfig,
    };
    use crate::firebase_auth::{FirebaseAuth, FIREBASE_DATABASE_SCOPE};
    use crate::http_client::build_http_client;
    use crate::test_server::{
        fake_token_endpoint, service_account_auth, spawn_test_server, TEST_ACCESS_TOKEN,
    };

    #[derive(Default)]
    struct FakeDatabase {
        books: parking_lot::Mutex<BTreeMap<String, serde_json::Value>>,
        next_key: parking_lot::Mutex<u32>,
        namespaces: parking_lot::Mutex<Vec<String>>,
        access_tokens: parking_lot::Mutex<Vec<String>>,
    }

    type Query = web::Query<HashMap<String, String>>;

    fn record_query(fake: &FakeDatabase, query: &Query) {
        if let Some(ns) = query.get("ns") {
            fake.namespaces.lock().push(ns.clone());
        }
        if let Some(token) = query.get("access_token") {
            fake.access_tokens.lock().push(token.clone());
        }
    }

    async fn get_collection(fake: web::Data<FakeDatabase>, query: Query) -> HttpResponse {
        record_query(&fake, &query);
        let books = fake.books.lock();
        if books.is_empty() {
            HttpResponse::Ok().json(serde_json::Value::Null)
        } else {
            HttpResponse::Ok().json(&*books)
        }
    }

    async fn push(
        fake: web::Data<FakeDatabase>,
        query: Query,
        body: web::Json<serde_json::Value>,
    ) -> HttpResponse {
        record_query(&fake, &query);
        let key = {
            let mut next_key = fake.next_key.lock();
            *next_key += 1;
            format!("-Nkey{:03}", *next_key)
        };
        fake.books.lock().insert(key.clone(), body.into_inner());
        HttpResponse::Ok().json(json!({ "name": key }))
    }

    async fn get_child(
        fake: web::Data<FakeDatabase>,
        query: Query,
        id: web::Path<String>,
    ) -> HttpResponse {
        record_query(&fake, &query);
        let book = fake.books.lock().get(id.as_str()).cloned();
        HttpResponse::Ok().json(book.unwrap_or(serde_json::Value::Null))
    }

    async fn put_child(
        fake: web::Data<FakeDatabase>,
        query: Query,
        id: web::Path<String>,
        body: web::Json<serde_json::Value>,
    ) -> HttpResponse {
        record_query(&fake, &query);
        let body = body.into_inner();
        fake.books.lock().insert(id.into_inner(), body.clone());
        HttpResponse::Ok().json(body)
    }

    async fn delete_child(
        fake: web::Data<FakeDatabase>,
        query: Query,
        id: web::Path<String>,
    ) -> HttpResponse {
        record_query(&fake, &query);
        fake.books.lock().remove(id.as_str());
        HttpResponse::Ok().json(serde_json::Value::Null)
    }

    fn start_fake_database(
        fake: web::Data<FakeDatabase>,
        auth: FirebaseAuth,
    ) -> RealtimeDatabaseBooksRepository {
        let url = spawn_test_server(move |cfg: &mut web::ServiceConfig| {
            cfg.app_data(fake.clone())
                .service(
                    web::resource("/books.json")
                        .route(web::get().to(get_collection))
                        .route(web::post().to(push)),
                )
                .service(
                    web::resource("/books/{id}.json")
                        .route(web::get().to(get_child))
                        .route(web::put().to(put_child))
                        .route(web::delete().to(delete_child)),
                );
        });

        RealtimeDatabaseBooksRepository::init(
            RealtimeDatabaseBooksRepositoryConfig {
                database_url: "https://firebooks-default-rtdb.firebaseio.com".to_string(),
                collection: "books".to_string(),
                emulator_host: Some(url.trim_start_matches("http://").to_string()),
            },
            auth,
            build_http_client().unwrap(),
        )
        .expect("Failed to init repository")
    }

    fn sample_book(title: &str) -> Book {
        Book {
            title: title.to_string(),
            author: "Iain M. Banks".to_string(),
            year: "1987".to_string(),
            added: Utc.with_ymd_and_hms(2022, 8, 9, 10, 11, 12).unwrap(),
        }
    }

    #[test]
    fn reference_urls_point_to_json_documents() {
        let repo = RealtimeDatabaseBooksRepository::init(
            RealtimeDatabaseBooksRepositoryConfig {
                database_url: "https://firebooks-default-rtdb.firebaseio.com/".to_string(),
                collection: "library/books".to_string(),
                emulator_host: None,
            },
            FirebaseAuth::Emulator,
            build_http_client().unwrap(),
        )
        .unwrap();

        assert_eq!(
            repo.reference_url(None).as_str(),
            "https://firebooks-default-rtdb.firebaseio.com/library/books.json"
        );
        assert_eq!(
            repo.reference_url(Some("-Nabc")).as_str(),
            "https://firebooks-default-rtdb.firebaseio.com/library/books/-Nabc.json"
        );
    }

    #[actix_web::test]
    /// Tests push, get and list against fake database
    async fn test_add_get_and_list_books() {
        let fake = web::Data::new(FakeDatabase::default());
        let repo = start_fake_database(fake.clone(), FirebaseAuth::Emulator);

        assert_eq!(repo.list_books().await.expect("Failed to list"), vec![]);

        let id_1 = repo
            .add_book(sample_book("Consider Phlebas"))
            .await
            .expect("Failed to add book");
        let id_2 = repo
            .add_book(sample_book("The Player of Games"))
            .await
            .expect("Failed to add book");
        assert_eq!(id_1, "-Nkey001");

        assert_eq!(
            repo.get_book(&id_2).await.expect("Failed to get book"),
            sample_book("The Player of Games")
        );
        assert_eq!(
            repo.list_books().await.expect("Failed to list"),
            vec![
                BookWithId::new(id_1, sample_book("Consider Phlebas")),
                BookWithId::new(id_2, sample_book("The Player of Games")),
            ]
        );

        // records are stored with plain json field names
        assert_eq!(
            fake.books.lock()["-Nkey001"]["added"],
            json!("2022-08-09T10:11:12Z")
        );
        assert!(fake
            .namespaces
            .lock()
            .iter()
            .all(|ns| ns == "firebooks-default-rtdb"));
        assert!(fake.access_tokens.lock().is_empty());
    }

    #[actix_web::test]
    /// Tests that null reference is reported as not found
    async fn test_get_missing_book() {
        let repo = start_fake_database(
            web::Data::new(FakeDatabase::default()),
            FirebaseAuth::Emulator,
        );

        let result = repo.get_book("-Nmissing").await;
        assert!(matches!(result, Err(BookRepositoryError::NotFound(id)) if id == "-Nmissing"));
    }

    #[actix_web::test]
    /// Tests set (replace and upsert) and delete
    async fn test_set_and_delete_book() {
        let fake = web::Data::new(FakeDatabase::default());
        let repo = start_fake_database(fake.clone(), FirebaseAuth::Emulator);

        let id = repo
            .add_book(sample_book("Excession"))
            .await
            .expect("Failed to add book");
        repo.set_book(&id, sample_book("Look to Windward"))
            .await
            .expect("Failed to set book");
        assert_eq!(
            repo.get_book(&id).await.unwrap(),
            sample_book("Look to Windward")
        );

        repo.set_book("chosen", sample_book("Matter"))
            .await
            .expect("Failed to set book");
        repo.delete_book(&id).await.expect("Failed to delete");
        repo.delete_book(&id)
            .await
            .expect("Deleting missing book should succeed");

        assert_eq!(
            repo.list_books().await.unwrap(),
            vec![BookWithId::new(
                "chosen".to_string(),
                sample_book("Matter")
            )]
        );
    }

    #[actix_web::test]
    /// Tests that service account tokens are sent as access_token parameter
    async fn test_service_account_token_is_sent() {
        let token_requests = Arc::new(AtomicUsize::new(0));
        let token_url = spawn_test_server(fake_token_endpoint(token_requests.clone(), true));
        let fake = web::Data::new(FakeDatabase::default());
        let repo = start_fake_database(
            fake.clone(),
            service_account_auth(&token_url, &[FIREBASE_DATABASE_SCOPE]),
        );

        let id = repo
            .add_book(sample_book("Use of Weapons"))
            .await
            .expect("Failed to add book");
        repo.get_book(&id).await.expect("Failed to get book");
        repo.list_books().await.expect("Failed to list");

        let tokens = fake.access_tokens.lock();
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(|token| token == TEST_ACCESS_TOKEN));
        assert_eq!(token_requests.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    /// Tests that wrongly typed book fields fail to parse
    async fn test_malformed_book_is_a_parse_failure() {
        let fake = web::Data::new(FakeDatabase::default());
        fake.books
            .lock()
            .insert("-Nbroken".to_string(), json!({"title": 12}));
        let repo = start_fake_database(fake, FirebaseAuth::Emulator);

        assert!(matches!(repo.list_books().await, Err(ref err) if err.is_parse_failure()));
        assert!(matches!(repo.get_book("-Nbroken").await, Err(ref err) if err.is_parse_failure()));
    }

    #[actix_web::test]
    /// Tests that a response which is not json is not reported as bad book data
    async fn test_malformed_response() {
        let url = spawn_test_server(|cfg: &mut web::ServiceConfig| {
            cfg.route(
                "/books.json",
                web::get().to(|| async {
                    HttpResponse::Ok()
                        .content_type("text/html")
                        .body("<html>Bad gateway</html>")
                }),
            );
        });
        let repo = RealtimeDatabaseBooksRepository::init(
            RealtimeDatabaseBooksRepositoryConfig {
                database_url: url,
                collection: "books".to_string(),
                emulator_host: None,
            },
            FirebaseAuth::Emulator,
            build_http_client().unwrap(),
        )
        .unwrap();

        let result = repo.list_books().await;
        assert!(matches!(
            result,
            Err(BookRepositoryError::MalformedResponse(..))
        ));
        assert!(!result.unwrap_err().is_parse_failure());
    }

    #[actix_web::test]
    /// Tests that rejected requests surface the database error message
    async fn test_database_error_is_reported() {
        let url = spawn_test_server(|cfg: &mut web::ServiceConfig| {
            cfg.route(
                "/books.json",
                web::get().to(|| async {
                    HttpResponse::Unauthorized().json(json!({"error": "Permission denied"}))
                }),
            );
        });
        let repo = RealtimeDatabaseBooksRepository::init(
            RealtimeDatabaseBooksRepositoryConfig {
                database_url: url,
                collection: "books".to_string(),
                emulator_host: None,
            },
            FirebaseAuth::Emulator,
            build_http_client().unwrap(),
        )
        .unwrap();

        let result = repo.list_books().await;
        assert!(matches!(
            result,
            Err(BookRepositoryError::DatabaseFailure { ref message, .. }) if message == "Permission denied"
        ));
    }
}
