use std::fmt;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
pub const FIREBASE_DATABASE_SCOPE: &str = "https://www.googleapis.com/auth/firebase.database";
pub const USERINFO_EMAIL_SCOPE: &str = "https://www.googleapis.com/auth/userinfo.email";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub(crate) const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;
/// Cached tokens are refreshed this long before they actually expire
const TOKEN_EXPIRY_MARGIN_SECONDS: i64 = 60;

#[derive(thiserror::Error, Debug)]
pub enum FirebaseAuthError {
    #[error("Failed to read credentials file {path}: {source}")]
    CredentialsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(#[from] serde_json::Error),

    #[error("Failed to sign token assertion: {0}")]
    SigningFailure(#[from] jsonwebtoken::errors::Error),

    #[error("Token request failed: {0}")]
    RequestFailure(#[from] reqwest_middleware::Error),

    #[error("Token response failure: {0}")]
    ResponseFailure(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {message}")]
    TokenRejected {
        status: reqwest::StatusCode,
        message: String,
    },
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Clone, Deserialize)]
/// Google service account key, the json file downloaded from the Firebase console
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, FirebaseAuthError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, FirebaseAuthError> {
        let json =
            std::fs::read_to_string(path).map_err(|source| FirebaseAuthError::CredentialsFile {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    access_token: String,
    refresh_at: DateTime<Utc>,
}

/// Exchanges signed service account assertions for OAuth2 access tokens
pub struct AccessTokenSource {
    key: ServiceAccountKey,
    scope: String,
    client: ClientWithMiddleware,
    cached: parking_lot::Mutex<Option<CachedToken>>,
}

impl AccessTokenSource {
    pub fn new(key: ServiceAccountKey, scopes: &[&str], client: ClientWithMiddleware) -> Self {
        Self {
            key,
            scope: scopes.join(" "),
            client,
            cached: Default::default(),
        }
    }

    fn signed_assertion(&self, now: DateTime<Utc>) -> Result<String, FirebaseAuthError> {
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.key.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECONDS,
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &key,
        )?)
    }

    fn cached_token(&self, now: DateTime<Utc>) -> Option<String> {
        self.cached
            .lock()
            .as_ref()
            .filter(|cached| cached.refresh_at > now)
            .map(|cached| cached.access_token.clone())
    }

    /// Returns cached access token or requests a new one from the token endpoint
    pub async fn access_token(&self) -> Result<String, FirebaseAuthError> {
        let now = Utc::now();
        if let Some(access_token) = self.cached_token(now) {
            return Ok(access_token);
        }

        tracing::debug!(
            "Requesting access token for {} from {}",
            self.key.client_email,
            self.key.token_uri
        );
        let assertion = self.signed_assertion(now)?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FirebaseAuthError::TokenRejected { status, message });
        }

        let token: TokenResponse = response.json().await?;
        let refresh_at =
            now + Duration::seconds(token.expires_in - TOKEN_EXPIRY_MARGIN_SECONDS);
        *self.cached.lock() = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_at,
        });
        Ok(token.access_token)
    }
}

pub enum FirebaseAuth {
    ServiceAccount(AccessTokenSource),
    /// Local emulators accept unauthenticated requests
    Emulator,
}

impl FirebaseAuth {
    pub async fn access_token(&self) -> Result<Option<String>, FirebaseAuthError> {
        match self {
            FirebaseAuth::ServiceAccount(source) => Ok(Some(source.access_token().await?)),
            FirebaseAuth::Emulator => Ok(None),
        }
    }
}
