use async_mutex::Mutex;
use cached::stores::TimedCache;
use cached::Cached;
use chrono::Utc;
use std::sync::Arc;

use crate::{crypto, spotify, store, CONFIG, LOG};

#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn store::SessionStore>,
    pub accounts: Arc<dyn spotify::Accounts>,
    // access tokens handed out recently, keyed by session token
    pub access_cache: Arc<Mutex<TimedCache<uuid::Uuid, String>>>,
}

impl Context {
    pub fn new(store: Arc<dyn store::SessionStore>, accounts: Arc<dyn spotify::Accounts>) -> Self {
        Self {
            store,
            accounts,
            access_cache: Arc::new(Mutex::new(TimedCache::with_lifespan(
                CONFIG.access_token_cache_seconds,
            ))),
        }
    }
}

pub fn app(ctx: Context) -> tide::Server<Context> {
    let mut app = tide::with_state(ctx);
    app.with(crate::logging::LogMiddleware::new());
    app.with(crate::cors::CorsMiddleware::new());
    app.at("/status").get(status);
    app.at("/auth/session-token").get(session_token);
    app.at("/auth/callback").get(auth_callback);
    app.at("/auth/get-access-token").get(get_access_token);
    app.at("/success").get(success_page);
    app.at("/expired").get(expired_page);
    app.at("/failed").get(failed_page);
    app
}

pub async fn start(ctx: Context) -> crate::Result<()> {
    let app = app(ctx);
    slog::info!(LOG, "running at {}", CONFIG.host());
    app.listen(CONFIG.host()).await?;
    Ok(())
}

#[derive(serde::Serialize)]
struct Status<'a> {
    ok: &'a str,
    version: &'a str,
}

async fn status(_req: tide::Request<Context>) -> tide::Result {
    Ok(resp!(json => Status {
        ok: "ok",
        version: &CONFIG.version
    }))
}

/// Pending logins that never completed are dropped before
/// every session lookup or creation.
async fn delete_stale_session_tokens(ctx: &Context) -> crate::Result<()> {
    let deleted = ctx
        .store
        .delete_stale(store::stale_cutoff(Utc::now()))
        .await?;
    if deleted > 0 {
        slog::info!(LOG, "deleted stale session tokens"; "count" => deleted);
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct SessionTokenResponse {
    session_token: uuid::Uuid,
}

/// Start a login. The player encodes the returned token as the
/// `state` of the spotify authorize url and then polls
/// `get-access-token` with it until the login completes.
async fn session_token(req: tide::Request<Context>) -> tide::Result {
    let ctx = req.state();
    delete_stale_session_tokens(ctx)
        .await
        .map_err(|e| se!("error deleting stale session tokens {}", e))?;
    let token = uuid::Uuid::new_v4();
    ctx.store
        .create(token)
        .await
        .map_err(|e| se!("error creating session token {}", e))?;
    slog::info!(LOG, "new session token"; "session_token" => token.to_string());
    Ok(resp!(json => SessionTokenResponse {
        session_token: token
    }))
}

#[derive(Debug, serde::Deserialize)]
struct SpotifyAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn frontend_redirect(page: &str) -> tide::Response {
    resp!(redirect => format!("{}/{}", CONFIG.frontend_url.trim_end_matches('/'), page))
}

/// After the user approves (or denies) access on another device,
/// spotify sends them back here with `code` and `state`. `state` is
/// the session token of the pending login, `code` is a single-use
/// token that we trade for a refresh token to attach to it.
async fn auth_callback(req: tide::Request<Context>) -> tide::Result {
    let ctx = req.state();
    let callback: SpotifyAuthCallback = match req.query() {
        Ok(c) => c,
        Err(e) => {
            slog::warn!(LOG, "invalid callback query {:?}", e);
            return Ok(frontend_redirect("failed"));
        }
    };
    if let Some(error) = callback.error {
        slog::info!(LOG, "spotify login was not approved"; "error" => error);
        return Ok(frontend_redirect("failed"));
    }

    let session_token = callback
        .state
        .as_deref()
        .and_then(|s| uuid::Uuid::parse_str(s).ok());
    let session_token = match session_token {
        None => return Ok(frontend_redirect("expired")),
        Some(t) => t,
    };
    let existing = ctx
        .store
        .find(session_token)
        .await
        .map_err(|e| se!("error finding session token {}", e))?;
    if existing.is_none() {
        slog::info!(LOG, "callback for unknown session token"; "session_token" => session_token.to_string());
        return Ok(frontend_redirect("expired"));
    }

    let code = match callback.code {
        None => return Ok(frontend_redirect("failed")),
        Some(c) => c,
    };
    let refresh_token = match ctx.accounts.exchange_code(&code).await {
        Err(e) => {
            slog::error!(LOG, "error exchanging authorization code {}", e);
            return Ok(frontend_redirect("failed"));
        }
        Ok(access) => match access.refresh_token {
            None => {
                slog::error!(LOG, "authorization code exchange returned no refresh token");
                return Ok(frontend_redirect("failed"));
            }
            Some(r) => r,
        },
    };

    let enc = crypto::encrypt(&refresh_token).map_err(|e| se!("encryption error {}", e))?;
    ctx.store
        .attach_refresh_token(session_token, &enc)
        .await
        .map_err(|e| se!("error attaching refresh token {}", e))?;
    slog::info!(LOG, "completed login"; "session_token" => session_token.to_string());
    Ok(frontend_redirect("success"))
}

#[derive(serde::Deserialize)]
struct AccessTokenParams {
    session_token: Option<String>,
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum AccessTokenResponse {
    Token { access_token: String },
    Error { error: &'static str },
}

impl AccessTokenResponse {
    fn error(error: &'static str) -> Self {
        AccessTokenResponse::Error { error }
    }
}

async fn lookup_access_token(ctx: &Context, params: &AccessTokenParams) -> crate::Result<AccessTokenResponse> {
    delete_stale_session_tokens(ctx).await?;

    let session_token = params
        .session_token
        .as_deref()
        .and_then(|s| uuid::Uuid::parse_str(s).ok());
    let session_token = match session_token {
        None => return Ok(AccessTokenResponse::error("invalid-session-token")),
        Some(t) => t,
    };
    let row = match ctx.store.find(session_token).await? {
        None => return Ok(AccessTokenResponse::error("invalid-session-token")),
        Some(row) => row,
    };
    let enc = match row.encrypted_refresh_token() {
        None => return Ok(AccessTokenResponse::error("no-refresh-token")),
        Some(enc) => enc,
    };

    {
        let mut cache = ctx.access_cache.lock().await;
        if let Some(access_token) = cache.cache_get(&session_token) {
            return Ok(AccessTokenResponse::Token {
                access_token: access_token.clone(),
            });
        }
    }

    let refresh_token = match crypto::decrypt(&enc) {
        Ok(r) => r,
        Err(e) => {
            slog::error!(LOG, "error decrypting refresh token {}", e; "session_token" => session_token.to_string());
            return Ok(AccessTokenResponse::error("auth-failed"));
        }
    };
    let access = match ctx.accounts.refresh(&refresh_token).await {
        Ok(a) => a,
        Err(e) => {
            slog::error!(LOG, "error refreshing access token {}", e; "session_token" => session_token.to_string());
            return Ok(AccessTokenResponse::error("auth-failed"));
        }
    };

    // spotify may hand back a new refresh token, the old one stops working
    if let Some(rotated) = access.refresh_token.as_ref() {
        if rotated != &refresh_token {
            let enc = crypto::encrypt(rotated)?;
            ctx.store.attach_refresh_token(session_token, &enc).await?;
            slog::info!(LOG, "stored rotated refresh token"; "session_token" => session_token.to_string());
        }
    }

    ctx.access_cache
        .lock()
        .await
        .cache_set(session_token, access.access_token.clone());
    Ok(AccessTokenResponse::Token {
        access_token: access.access_token,
    })
}

/// Trade the refresh token attached to a session token for a fresh
/// access token. Failures are reported as `{"error": ...}` bodies.
async fn get_access_token(req: tide::Request<Context>) -> tide::Result {
    let ctx = req.state();
    let params: AccessTokenParams = req
        .query()
        .unwrap_or(AccessTokenParams { session_token: None });
    let reply = lookup_access_token(ctx, &params)
        .await
        .map_err(|e| se!("error getting access token {}", e))?;
    Ok(resp!(json => reply))
}

fn page(body: &str) -> tide::Response {
    tide::Response::builder(200)
        .body(body)
        .content_type(tide::http::mime::PLAIN)
        .build()
}

async fn success_page(_req: tide::Request<Context>) -> tide::Result {
    Ok(page("You have been logged in, you can close this page"))
}

async fn expired_page(_req: tide::Request<Context>) -> tide::Result {
    Ok(page("Code expired"))
}

async fn failed_page(_req: tide::Request<Context>) -> tide::Result {
    Ok(page("Auth Failed"))
}
