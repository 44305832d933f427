use crate::error::{AuthError, PushSendError};
use crate::models::notification::NotificationMessage;
use chrono::{DateTime, Duration as TokenLifetime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// OAuth scope that allows sending through FCM HTTP v1.
pub const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
// Refresh a little early so a token never expires mid-request.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Outbound push messaging. Each call stands alone; a failure only concerns
/// that one message.
pub trait PushGateway: Sync {
    fn send(
        &self,
        message: &NotificationMessage,
    ) -> impl Future<Output = Result<(), PushSendError>> + Send;
}

impl<T: PushGateway + Send> PushGateway for Arc<T> {
    async fn send(&self, message: &NotificationMessage) -> Result<(), PushSendError> {
        PushGateway::send(&**self, message).await
    }
}

/// Supplies the bearer token sent with every push request.
pub trait AccessTokenSource: Sync {
    fn access_token(&self) -> impl Future<Output = Result<String, AuthError>> + Send;
}

/// The fields of a Google service account key file that the token exchange
/// needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self, AuthError> {
        serde_json::from_str(raw).map_err(|e| AuthError::Credentials(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AuthError::Credentials(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }
}

#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenReply {
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
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - TokenLifetime::seconds(TOKEN_REFRESH_MARGIN_SECS) > now
    }
}

/// OAuth access tokens for a service account, obtained with the JWT bearer
/// grant and cached until shortly before they expire.
pub struct ServiceAccountTokens {
    client: reqwest::Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    pub fn new(key: ServiceAccountKey, timeout: Duration) -> Result<Self, AuthError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            key,
            signing_key,
            cache: Mutex::new(None),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.key.project_id
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = GrantClaims {
            iss: &self.key.client_email,
            scope: FCM_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)?)
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken, AuthError> {
        let assertion = self.assertion(now)?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Exchange {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let reply: TokenReply = response.json().await?;
        info!(
            "Obtained FCM access token for {} (valid {} seconds)",
            self.key.client_email, reply.expires_in
        );
        Ok(CachedToken {
            value: reply.access_token,
            expires_at: now + TokenLifetime::seconds(reply.expires_in),
        })
    }
}

impl AccessTokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut cache = self.cache.lock().await;
        let now = Utc::now();
        if let Some(token) = cache.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let fresh = self.exchange(now).await?;
        let value = fresh.value.clone();
        *cache = Some(fresh);
        Ok(value)
    }
}

/// Firebase Cloud Messaging over the HTTP v1 API.
#[derive(Debug, Clone)]
pub struct FcmGateway<A> {
    client: reqwest::Client,
    send_url: String,
    tokens: A,
}

impl<A: AccessTokenSource> FcmGateway<A> {
    pub fn new(
        endpoint: &str,
        project_id: &str,
        tokens: A,
        timeout: Duration,
    ) -> Result<Self, PushSendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            send_url: send_url(endpoint, project_id),
            tokens,
        })
    }

    pub fn send_url(&self) -> &str {
        &self.send_url
    }
}

pub fn send_url(endpoint: &str, project_id: &str) -> String {
    format!(
        "{}/v1/projects/{}/messages:send",
        endpoint.trim_end_matches('/'),
        project_id
    )
}

/// Request body for one device. The Android `tag` and the APNs collapse id
/// make the device replace an earlier notification for the same event
/// instead of stacking a new one.
pub fn fcm_payload(message: &NotificationMessage) -> Value {
    json!({
        "message": {
            "token": message.target_token,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "android": {
                "priority": "high",
                "notification": {
                    "tag": message.dedupe_tag,
                },
            },
            "apns": {
                "headers": {
                    "apns-collapse-id": message.dedupe_tag,
                },
            },
            "data": {
                "event_id": message.event_id,
                "danger_score": message.danger_score.to_string(),
            },
        }
    })
}

#[derive(Debug, Deserialize)]
struct FcmErrorReply {
    error: FcmErrorBody,
}

#[derive(Debug, Deserialize)]
struct FcmErrorBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct FcmErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

/// Maps the gateway's reply to the outcome of a single send.
///
/// Token problems are `UNREGISTERED`, `INVALID_ARGUMENT` and
/// `SENDER_ID_MISMATCH`, plus a 404 or 410 without a more specific code. Everything else, including
/// 401 and 403 (our credentials, not the device's token), is `Rejected`.
fn interpret_response(status: StatusCode, body: &str) -> Result<(), PushSendError> {
    if status.is_success() {
        return Ok(());
    }

    let (code, detail) = match serde_json::from_str::<FcmErrorReply>(body) {
        Ok(reply) => {
            let code = reply
                .error
                .details
                .into_iter()
                .find_map(|d| d.error_code)
                .unwrap_or(reply.error.status);
            (code, reply.error.message)
        }
        Err(_) => (String::new(), body.chars().take(200).collect()),
    };

    match code.as_str() {
        "UNREGISTERED" | "INVALID_ARGUMENT" | "SENDER_ID_MISMATCH" => {
            Err(PushSendError::InvalidToken(format!("{}: {}", code, detail)))
        }
        "" | "NOT_FOUND" if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) => Err(
            PushSendError::InvalidToken(format!("gateway answered {}", status.as_u16())),
        ),
        _ => Err(PushSendError::Rejected {
            status: status.as_u16(),
            message: if code.is_empty() {
                detail
            } else {
                format!("{}: {}", code, detail)
            },
        }),
    }
}

impl<A: AccessTokenSource> PushGateway for FcmGateway<A> {
    async fn send(&self, message: &NotificationMessage) -> Result<(), PushSendError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(token)
            .json(&fcm_payload(message))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(
            "FCM answered {} for event {} ({})",
            status, message.event_id, message.dedupe_tag
        );
        interpret_response(status, &body)
    }
}
