use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Url};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::Database;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
pub const TOKEN_CACHE_KEY_ENV: &str = "ORDERMAIL_TOKEN_CACHE_KEY";

const CACHE_SKEW_SECONDS: i64 = 60;
const CACHE_KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;
const ENVELOPE_VERSION: u8 = 1;

/// OAuth client for the Gmail consent and refresh-token grants.
#[derive(Debug, Clone)]
pub struct GoogleAuthorizer {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
}

/// Result of exchanging a consent code.
#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl GoogleAuthorizer {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Consent page the operator opens once to grant offline access.
    pub fn authorization_url(&self, redirect_uri: &str) -> Result<Url> {
        Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", GMAIL_MODIFY_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .context("build google consent url")
    }

    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant> {
        let payload = self
            .request_token(
                &[
                    ("code", code.trim()),
                    ("redirect_uri", redirect_uri),
                    ("grant_type", "authorization_code"),
                ],
                "exchange authorization code",
            )
            .await?;

        Ok(TokenGrant {
            expires_at: expires_at(payload.expires_in),
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
        })
    }

    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<CachedAccessToken> {
        let payload = self
            .request_token(
                &[
                    ("refresh_token", refresh_token),
                    ("grant_type", "refresh_token"),
                ],
                "refresh access token",
            )
            .await?;

        Ok(CachedAccessToken {
            expires_at: expires_at(payload.expires_in),
            access_token: payload.access_token,
        })
    }

    /// Returns a usable access token, preferring an unexpired cached one.
    pub async fn access_token(
        &self,
        refresh_token: &str,
        cache: Option<&TokenCache<'_>>,
    ) -> Result<String> {
        if let Some(cache) = cache {
            if let Some(cached) = cache.load()? {
                debug!("using cached gmail access token");
                return Ok(cached.access_token);
            }
        }

        let fresh = self.refresh_access_token(refresh_token).await?;
        if let Some(cache) = cache {
            cache.store(&fresh)?;
        }
        Ok(fresh.access_token)
    }

    async fn request_token(
        &self,
        grant: &[(&str, &str)],
        action: &str,
    ) -> Result<OAuthTokenResponse> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        form.extend_from_slice(grant);

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .with_context(|| format!("{action}: request {}", self.token_url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("{action}: read token response"))?;
        if !status.is_success() {
            bail!(
                "{action} failed: status={status} body={}",
                body.chars().take(200).collect::<String>()
            );
        }

        serde_json::from_str(&body).with_context(|| format!("{action}: decode token response"))
    }
}

fn expires_at(expires_in: Option<i64>) -> DateTime<Utc> {
    let lifetime = expires_in.unwrap_or(3600).max(0) - CACHE_SKEW_SECONDS;
    Utc::now() + Duration::seconds(lifetime.max(0))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccessToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedAccessToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedToken {
    version: u8,
    nonce: String,
    ciphertext: String,
}

/// AES-256-GCM sealed access token kept in `sync_state`.
pub struct TokenCache<'a> {
    db: &'a Database,
    user_id: String,
    key: [u8; CACHE_KEY_BYTES],
}

impl<'a> TokenCache<'a> {
    pub fn new(db: &'a Database, user_id: impl Into<String>, key: [u8; CACHE_KEY_BYTES]) -> Self {
        Self {
            db,
            user_id: user_id.into(),
            key,
        }
    }

    /// Builds a cache from a 64 hex character key, or `None` when no key is set.
    pub fn from_hex_key(
        db: &'a Database,
        user_id: impl Into<String>,
        hex_key: Option<&str>,
    ) -> Result<Option<Self>> {
        let Some(raw) = hex_key.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Ok(None);
        };
        let key = parse_cache_key(raw)
            .with_context(|| format!("{TOKEN_CACHE_KEY_ENV} must be 64 hex characters"))?;
        Ok(Some(Self::new(db, user_id, key)))
    }

    fn state_key(&self) -> String {
        format!("gmail_access_token:{}", self.user_id)
    }

    pub fn load(&self) -> Result<Option<CachedAccessToken>> {
        let state_key = self.state_key();
        let Some(raw) = self
            .db
            .get_sync_state(&state_key)?
            .and_then(|state| state.value)
        else {
            return Ok(None);
        };

        let token = match self.open(&raw) {
            Ok(token) => token,
            Err(error) => {
                warn!(user_id = %self.user_id, "discarding unreadable token cache: {error:#}");
                self.clear()?;
                return Ok(None);
            }
        };

        if token.is_expired() {
            self.clear()?;
            return Ok(None);
        }
        Ok(Some(token))
    }

    pub fn store(&self, token: &CachedAccessToken) -> Result<()> {
        let sealed = self.seal(token)?;
        self.db
            .set_sync_state(&self.state_key(), &sealed)
            .context("write access token to sync_state")
    }

    pub fn clear(&self) -> Result<()> {
        self.db
            .clear_sync_state(&self.state_key())
            .context("clear cached access token")
    }

    fn aead_key(&self) -> Result<LessSafeKey> {
        let unbound =
            UnboundKey::new(&AES_256_GCM, &self.key).map_err(|_| anyhow!("invalid cache key"))?;
        Ok(LessSafeKey::new(unbound))
    }

    fn seal(&self, token: &CachedAccessToken) -> Result<String> {
        let mut in_out = serde_json::to_vec(token).context("serialize access token")?;
        let mut nonce = [0u8; NONCE_BYTES];
        SystemRandom::new()
            .fill(&mut nonce)
            .map_err(|_| anyhow!("generate token cache nonce"))?;

        self.aead_key()?
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
            .map_err(|_| anyhow!("seal access token"))?;

        serde_json::to_string(&SealedToken {
            version: ENVELOPE_VERSION,
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(&in_out),
        })
        .context("serialize sealed token")
    }

    fn open(&self, raw: &str) -> Result<CachedAccessToken> {
        let sealed: SealedToken = serde_json::from_str(raw).context("parse sealed token")?;
        if sealed.version != ENVELOPE_VERSION {
            bail!("unsupported sealed token version {}", sealed.version);
        }

        let nonce: [u8; NONCE_BYTES] = STANDARD
            .decode(&sealed.nonce)
            .context("decode nonce")?
            .try_into()
            .map_err(|_| anyhow!("nonce must be {NONCE_BYTES} bytes"))?;
        let mut in_out = STANDARD
            .decode(&sealed.ciphertext)
            .context("decode ciphertext")?;

        let plaintext = self
            .aead_key()?
            .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
            .map_err(|_| anyhow!("open sealed token"))?;
        serde_json::from_slice(plaintext).context("parse access token")
    }
}

fn parse_cache_key(raw: &str) -> Result<[u8; CACHE_KEY_BYTES]> {
    if raw.len() != CACHE_KEY_BYTES * 2 || !raw.is_ascii() {
        bail!("expected {} hex characters, got {}", CACHE_KEY_BYTES * 2, raw.len());
    }

    let mut key = [0u8; CACHE_KEY_BYTES];
    for (index, byte) in key.iter_mut().enumerate() {
        let pair = &raw[index * 2..index * 2 + 2];
        *byte = u8::from_str_radix(pair, 16).with_context(|| format!("invalid hex pair '{pair}'"))?;
    }
    Ok(key)
}
