use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer};
use serde_json::json;

use crate::firebase_auth::{
    AccessTokenSource, FirebaseAuth, ServiceAccountKey, JWT_BEARER_GRANT_TYPE,
};
use crate::http_client::build_http_client;

pub const SERVICE_ACCOUNT_JSON: &str = include_str!("../test_data/service_account.json");
pub const TEST_ACCESS_TOKEN: &str = "ya29.test-token";

/// Starts actix server on a random local port, returns its base url.
/// Has to be called from within actix system (e.g. `#[actix_web::test]`)
pub fn spawn_test_server<F>(configure: F) -> String
where
    F: Fn(&mut web::ServiceConfig) + Send + Clone + 'static,
{
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind test port");
    let port = listener
        .local_addr()
        .expect("Failed to read test server address")
        .port();
    let server = HttpServer::new(move || App::new().configure(configure.clone()))
        .workers(1)
        .listen(listener)
        .expect("Failed to start test server")
        .run();
    actix_web::rt::spawn(server);
    format!("http://127.0.0.1:{}", port)
}

#[derive(serde::Deserialize)]
struct TokenForm {
    grant_type: String,
    assertion: String,
}

/// OAuth2 token endpoint served at `/token`, counts received requests
pub fn fake_token_endpoint(
    requests: Arc<AtomicUsize>,
    accept: bool,
) -> impl Fn(&mut web::ServiceConfig) + Send + Clone + 'static {
    move |cfg: &mut web::ServiceConfig| {
        let requests = requests.clone();
        cfg.route(
            "/token",
            web::post().to(move |form: web::Form<TokenForm>| {
                let requests = requests.clone();
                async move {
                    requests.fetch_add(1, Ordering::SeqCst);
                    if !accept || form.grant_type != JWT_BEARER_GRANT_TYPE {
                        return HttpResponse::BadRequest().body("invalid_grant");
                    }
                    assert_eq!(form.assertion.split('.').count(), 3);
                    HttpResponse::Ok().json(json!({
                        "access_token": TEST_ACCESS_TOKEN,
                        "expires_in": 3599,
                        "token_type": "Bearer"
                    }))
                }
            }),
        );
    }
}

/// Test service account whose tokens are issued by the fake endpoint at `token_server_url`
pub fn service_account_auth(token_server_url: &str, scopes: &[&str]) -> FirebaseAuth {
    let key = ServiceAccountKey {
        token_uri: format!("{}/token", token_server_url),
        ..ServiceAccountKey::from_json(SERVICE_ACCOUNT_JSON).expect("Invalid test key")
    };
    FirebaseAuth::ServiceAccount(AccessTokenSource::new(
        key,
        scopes,
        build_http_client().expect("Failed to build http client"),
    ))
}
