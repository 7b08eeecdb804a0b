use async_trait::async_trait;

use super::store::LocalStore;
use crate::{Result, LOG};

pub const SPOTIFY_AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub const PLAYER_SCOPES: &str =
    "user-read-playback-state user-read-currently-playing user-modify-playback-state";

#[derive(Debug, Clone, PartialEq)]
pub enum AccessTokenReply {
    AccessToken(String),
    // one of `invalid-session-token`, `no-refresh-token`, `auth-failed`
    Error(String),
}

#[derive(serde::Deserialize)]
struct SessionTokenBody {
    session_token: String,
}

#[derive(serde::Deserialize)]
struct AccessTokenBody {
    access_token: Option<String>,
    error: Option<String>,
}

impl From<AccessTokenBody> for AccessTokenReply {
    fn from(body: AccessTokenBody) -> Self {
        match (body.error, body.access_token) {
            (Some(error), _) => AccessTokenReply::Error(error),
            (None, Some(token)) => AccessTokenReply::AccessToken(token),
            (None, None) => AccessTokenReply::Error("auth-failed".to_string()),
        }
    }
}

/// The auth broker backend
#[async_trait]
pub trait Backend: Send + Sync {
    async fn session_token(&self) -> Result<String>;
    async fn get_access_token(&self, session_token: &str) -> Result<AccessTokenReply>;
}

pub struct BackendClient {
    client: surf::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: surf::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn session_token(&self) -> Result<String> {
        let mut resp = self
            .client
            .get(format!("{}/auth/session-token", self.base_url))
            .send()
            .await
            .map_err(|e| se!("session token request error {}", e))?;
        if !resp.status().is_success() {
            return Err(se!("session token request failed {}", resp.status()).into());
        }
        let body: SessionTokenBody = resp
            .body_json()
            .await
            .map_err(|e| se!("session token json error {}", e))?;
        Ok(body.session_token)
    }

    async fn get_access_token(&self, session_token: &str) -> Result<AccessTokenReply> {
        let url = surf::Url::parse_with_params(
            &format!("{}/auth/get-access-token", self.base_url),
            &[("session_token", session_token)],
        )
        .map_err(|e| se!("invalid backend url {}", e))?;
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| se!("access token request error {}", e))?;
        if !resp.status().is_success() {
            return Err(se!("access token request failed {}", resp.status()).into());
        }
        let body: AccessTokenBody = resp
            .body_json()
            .await
            .map_err(|e| se!("access token json error {}", e))?;
        Ok(body.into())
    }
}

/// The spotify url the user approves this player at
pub fn authorize_url(client_id: &str, redirect_uri: &str, session_token: &str) -> Result<String> {
    let url = surf::Url::parse_with_params(
        SPOTIFY_AUTHORIZE_URL,
        &[
            ("response_type", "code"),
            ("client_id", client_id),
            ("scope", PLAYER_SCOPES),
            ("redirect_uri", redirect_uri),
            ("state", session_token),
        ],
    )
    .map_err(|e| se!("invalid authorize url {}", e))?;
    Ok(url.to_string())
}

/// Start a new login: ask the backend for a session token,
/// remember it, and return the url to approve it at.
pub async fn login_url<B: Backend + ?Sized>(
    backend: &B,
    store: &LocalStore,
    client_id: &str,
    redirect_uri: &str,
) -> Result<String> {
    let session_token = backend.session_token().await?;
    store.set_session_token(&session_token).await?;
    authorize_url(client_id, redirect_uri, &session_token)
}

/// Whether the stored session has completed its login. On success the
/// fresh access token is stored for the spotify client to use.
pub async fn is_logged_in<B: Backend + ?Sized>(backend: &B, store: &LocalStore) -> bool {
    let session_token = match store.session_token().await {
        None => return false,
        Some(t) => t,
    };
    match backend.get_access_token(&session_token).await {
        Err(e) => {
            slog::debug!(LOG, "access token check failed {}", e);
            false
        }
        Ok(AccessTokenReply::Error(error)) => {
            slog::debug!(LOG, "not logged in"; "reason" => error);
            false
        }
        Ok(AccessTokenReply::AccessToken(token)) => match store.set_access_token(&token).await {
            Ok(_) => true,
            Err(e) => {
                slog::error!(LOG, "error storing access token {}", e);
                false
            }
        },
    }
}

/// The url as a terminal-printable QR code
pub fn qr_code(url: &str) -> Result<String> {
    let code = qrcode::QrCode::new(url.as_bytes()).map_err(|e| se!("qr code error {}", e))?;
    Ok(code
        .render::<qrcode::render::unicode::Dense1x2>()
        .quiet_zone(true)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeBackend {
        reply: Mutex<Result<AccessTokenReply>>,
        asked: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn replying(reply: Result<AccessTokenReply>) -> Self {
            Self {
                reply: Mutex::new(reply),
                asked: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn session_token(&self) -> Result<String> {
            Ok("11111111-2222-3333-4444-555555555555".to_string())
        }

        async fn get_access_token(&self, session_token: &str) -> Result<AccessTokenReply> {
            self.asked.lock().unwrap().push(session_token.to_string());
            match &*self.reply.lock().unwrap() {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(se!("{}", e).into()),
            }
        }
    }

    fn temp_store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("tokens.json"));
        (dir, store)
    }

    #[test]
    fn authorize_url_carries_state_and_scopes() {
        let url = authorize_url("cid", "http://host:3000/auth/callback", "tok").unwrap();
        let parsed = surf::Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("accounts.spotify.com"));
        assert_eq!(parsed.path(), "/authorize");
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "cid");
        assert_eq!(pairs["scope"], PLAYER_SCOPES);
        assert_eq!(pairs["redirect_uri"], "http://host:3000/auth/callback");
        assert_eq!(pairs["state"], "tok");
    }

    #[test]
    fn reply_body_prefers_error() {
        let body: AccessTokenBody =
            serde_json::from_str(r#"{"error":"no-refresh-token"}"#).unwrap();
        assert_eq!(
            AccessTokenReply::from(body),
            AccessTokenReply::Error("no-refresh-token".to_string())
        );
        let body: AccessTokenBody = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(
            AccessTokenReply::from(body),
            AccessTokenReply::AccessToken("a".to_string())
        );
    }

    #[async_std::test]
    async fn not_logged_in_without_session_token() {
        let (_dir, store) = temp_store();
        let backend = FakeBackend::replying(Ok(AccessTokenReply::AccessToken("a".into())));
        assert!(!is_logged_in(&backend, &store).await);
        assert!(backend.asked.lock().unwrap().is_empty());
    }

    #[async_std::test]
    async fn logged_in_stores_access_token() {
        let (_dir, store) = temp_store();
        store.set_session_token("s1").await.unwrap();
        let backend = FakeBackend::replying(Ok(AccessTokenReply::AccessToken("a1".into())));
        assert!(is_logged_in(&backend, &store).await);
        assert_eq!(store.access_token().await.as_deref(), Some("a1"));
        assert_eq!(*backend.asked.lock().unwrap(), vec!["s1".to_string()]);
    }

    #[async_std::test]
    async fn error_replies_and_failures_are_logged_out() {
        let (_dir, store) = temp_store();
        store.set_session_token("s1").await.unwrap();
        let backend = FakeBackend::replying(Ok(AccessTokenReply::Error("no-refresh-token".into())));
        assert!(!is_logged_in(&backend, &store).await);
        let backend = FakeBackend::replying(Err(se!("connection refused").into()));
        assert!(!is_logged_in(&backend, &store).await);
        assert!(store.access_token().await.is_none());
    }

    #[async_std::test]
    async fn login_url_remembers_session_token() {
        let (_dir, store) = temp_store();
        let backend = FakeBackend::replying(Ok(AccessTokenReply::Error("no-refresh-token".into())));
        let url = login_url(&backend, &store, "cid", "http://cb").await.unwrap();
        assert!(url.contains("state=11111111-2222-3333-4444-555555555555"));
        assert_eq!(
            store.session_token().await.as_deref(),
            Some("11111111-2222-3333-4444-555555555555")
        );
    }

    #[test]
    fn qr_code_renders_blocks() {
        let qr = qr_code("https://accounts.spotify.com/authorize?state=x").unwrap();
        assert!(qr.lines().count() > 10);
    }
}
