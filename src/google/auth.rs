//! OAuth access tokens for Google APIs.
//!
//! Service accounts authenticate with the JWT bearer grant: a claim set
//! signed with the account's RSA key (RS256) is exchanged at the token
//! endpoint for a short-lived access token. Tokens are cached until one
//! minute before expiry.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

pub const SCOPE_SPREADSHEETS: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const SCOPE_DRIVE: &str = "https://www.googleapis.com/auth/drive";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid service account key: {0}")]
    InvalidKey(String),

    #[error("token request failed: {0}")]
    Request(String),

    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl AuthError {
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::InvalidKey(_) => false,
            AuthError::Request(_) => true,
            AuthError::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// The fields of a service-account JSON key the grant needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    TOKEN_LIFETIME_SECS as u64
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Exchanges signed JWTs for access tokens.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scope: String,
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("client_email", &self.key.client_email)
            .field("token_uri", &self.key.token_uri)
            .field("scope", &self.scope)
            .finish()
    }
}

impl ServiceAccountAuth {
    /// Build from the JSON key blob (as downloaded from the cloud console).
    pub fn from_json(json: &str, scopes: &[&str], http: Client) -> Result<Self, AuthError> {
        let key: ServiceAccountKey =
            serde_json::from_str(json).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        // keys pasted into environment variables often carry literal "\n"
        let pem = key.private_key.replace("\\n", "\n");
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        Ok(Self {
            key,
            encoding_key,
            scope: scopes.join(" "),
            http,
            cached: Mutex::new(None),
        })
    }

    /// Signed RS256 assertion valid for one hour from now.
    fn assertion(&self) -> Result<String, AuthError> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidKey(e.to_string()))
    }

    #[instrument(level = "info", skip_all, fields(client_email = %self.key.client_email))]
    pub async fn token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.token.clone());
        }

        let assertion = self.assertion()?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        info!(expires_in = token.expires_in, "Obtained access token");
        Ok(token.access_token)
    }
}

/// Where Google API calls get their bearer token from.
#[derive(Debug)]
pub enum GoogleAuth {
    ServiceAccount(ServiceAccountAuth),
    /// A ready-made access token, e.g. from `gcloud auth print-access-token`.
    StaticToken(String),
}

impl GoogleAuth {
    pub async fn token(&self) -> Result<String, AuthError> {
        match self {
            GoogleAuth::ServiceAccount(auth) => auth.token().await,
            GoogleAuth::StaticToken(token) => {
                debug!("Using static access token");
                Ok(token.clone())
            }
        }
    }
}
