// src/warehouse/auth.rs

use anyhow::{bail, Context, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{env, path::Path};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Config;

pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Refresh this many seconds before the token actually expires.
const EXPIRY_SLACK_SECS: i64 = 60;
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// The fields of a service-account key file we actually use.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading service-account key {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing service-account key {}", path.display()))
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: i64,
}

enum Credentials {
    /// A token minted elsewhere (`BIGQUERY_ACCESS_TOKEN`), used as-is.
    Static(String),
    ServiceAccount {
        key: ServiceAccountKey,
        token_uri: String,
    },
}

/// Hands out OAuth2 bearer tokens for the BigQuery API.
pub struct TokenProvider {
    http: Client,
    credentials: Credentials,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn static_token(token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            credentials: Credentials::Static(token.into()),
            cached: Mutex::new(None),
        }
    }

    /// The key's own `token_uri` wins over `default_token_uri`.
    pub fn service_account(http: Client, key: ServiceAccountKey, default_token_uri: &str) -> Self {
        let token_uri = key
            .token_uri
            .clone()
            .unwrap_or_else(|| default_token_uri.to_string());
        Self {
            http,
            credentials: Credentials::ServiceAccount { key, token_uri },
            cached: Mutex::new(None),
        }
    }

    /// `BIGQUERY_ACCESS_TOKEN` if set, otherwise the configured key file.
    pub fn from_config(http: Client, cfg: &Config) -> Result<Self> {
        if let Ok(token) = env::var("BIGQUERY_ACCESS_TOKEN") {
            info!("using access token from BIGQUERY_ACCESS_TOKEN");
            return Ok(Self::static_token(token));
        }
        let Some(path) = cfg.credentials_path.as_deref() else {
            bail!("no credentials: set credentials_path or GOOGLE_APPLICATION_CREDENTIALS");
        };
        let key = ServiceAccountKey::from_file(path)?;
        info!(client_email = %key.client_email, "using service-account credentials");
        Ok(Self::service_account(http, key, &cfg.token_uri))
    }

    /// A bearer token valid for at least the next minute.
    pub async fn token(&self) -> Result<String> {
        let (key, token_uri) = match &self.credentials {
            Credentials::Static(token) => return Ok(token.clone()),
            Credentials::ServiceAccount { key, token_uri } => (key, token_uri),
        };

        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(tok) = cached.as_ref() {
            if tok.expires_at - EXPIRY_SLACK_SECS > now {
                return Ok(tok.value.clone());
            }
        }

        let fresh = self.exchange(key, token_uri, now).await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn exchange(
        &self,
        key: &ServiceAccountKey,
        token_uri: &str,
        now: i64,
    ) -> Result<CachedToken> {
        let claims = Claims {
            iss: &key.client_email,
            scope: BIGQUERY_SCOPE,
            aud: token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("service-account private_key is not an RSA PEM")?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .context("signing token assertion")?;

        debug!(token_uri, "exchanging assertion for access token");
        let resp: TokenResponse = self
            .http
            .post(token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("requesting access token")?
            .error_for_status()
            .context("token endpoint rejected the assertion")?
            .json()
            .await
            .context("decoding token response")?;

        Ok(CachedToken {
            value: resp.access_token,
            expires_at: now + resp.expires_in,
        })
    }
}
