use async_trait::async_trait;

use crate::{Result, CONFIG, LOG};

pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

#[derive(serde::Deserialize, Debug, Clone)]
pub struct SpotifyAccess {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
}

#[derive(serde::Serialize)]
struct SpotifyAccessParams {
    grant_type: String,
    code: String,
    redirect_uri: String,
}

impl SpotifyAccessParams {
    fn from_code(code: &str) -> Self {
        SpotifyAccessParams {
            grant_type: "authorization_code".to_string(),
            code: code.to_string(),
            redirect_uri: CONFIG.spotify_redirect_uri.clone(),
        }
    }
}

#[derive(serde::Serialize)]
struct RefreshParams {
    grant_type: String,
    refresh_token: String,
    client_id: String,
}

impl RefreshParams {
    fn from_token(token: &str) -> Self {
        RefreshParams {
            grant_type: "refresh_token".to_string(),
            refresh_token: token.to_string(),
            client_id: CONFIG.spotify_client_id.clone(),
        }
    }
}

/// Spotify's accounts service, the only thing the backend talks to
#[async_trait]
pub trait Accounts: Send + Sync {
    /// Trade a one-time authorization `code` for an access/refresh token pair
    async fn exchange_code(&self, code: &str) -> Result<SpotifyAccess>;

    /// Trade a refresh token for a new access token
    async fn refresh(&self, refresh_token: &str) -> Result<SpotifyAccess>;
}

pub struct SurfAccounts {
    client: surf::Client,
    token_url: String,
}

impl SurfAccounts {
    pub fn new() -> Self {
        Self {
            client: surf::Client::new(),
            token_url: SPOTIFY_TOKEN_URL.to_string(),
        }
    }

    fn basic_auth(&self) -> String {
        let auth = base64::encode(
            format!("{}:{}", CONFIG.spotify_client_id, CONFIG.spotify_secret_id).as_bytes(),
        );
        format!("Basic {}", auth)
    }

    async fn post_form<T: serde::Serialize>(&self, form: &T) -> Result<SpotifyAccess> {
        let body = surf::Body::from_form(form).map_err(|e| se!("form error {}", e))?;
        let mut resp = self
            .client
            .post(&self.token_url)
            .body(body)
            .header("authorization", self.basic_auth())
            .send()
            .await
            .map_err(|e| se!("account request error {:?}", e))?;
        let status = resp.status();
        let access: serde_json::Value = resp
            .body_json()
            .await
            .map_err(|e| se!("account json parse to value error {:?}", e))?;
        if !status.is_success() {
            return Err(se!(
                "account request failed {}: {} {}",
                status,
                access["error"].as_str().unwrap_or("unknown"),
                access["error_description"].as_str().unwrap_or(""),
            )
            .into());
        }
        let access: SpotifyAccess = serde_json::from_value(access)
            .map_err(|e| se!("account json parse error {:?}", e))?;
        Ok(access)
    }
}

impl Default for SurfAccounts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Accounts for SurfAccounts {
    async fn exchange_code(&self, code: &str) -> Result<SpotifyAccess> {
        let access = self.post_form(&SpotifyAccessParams::from_code(code)).await?;
        slog::debug!(LOG, "exchanged authorization code"; "scope" => &access.scope);
        Ok(access)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SpotifyAccess> {
        let access = self
            .post_form(&RefreshParams::from_token(refresh_token))
            .await?;
        slog::debug!(
            LOG, "refreshed access token";
            "expires_in" => access.expires_in,
            "rotated" => access.refresh_token.is_some(),
        );
        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_params_use_configured_redirect() {
        let form = serde_json::to_value(SpotifyAccessParams::from_code("abc")).unwrap();
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["code"], "abc");
        assert_eq!(form["redirect_uri"], CONFIG.spotify_redirect_uri.as_str());
    }

    #[test]
    fn refresh_params_carry_client_id() {
        let form = serde_json::to_value(RefreshParams::from_token("r1")).unwrap();
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["refresh_token"], "r1");
        assert_eq!(form["client_id"], CONFIG.spotify_client_id.as_str());
    }

    #[test]
    fn access_without_refresh_token_parses() {
        let access: SpotifyAccess = serde_json::from_value(serde_json::json!({
            "access_token": "a",
            "token_type": "Bearer",
            "expires_in": 3600,
        }))
        .unwrap();
        assert_eq!(access.access_token, "a");
        assert!(access.refresh_token.is_none());
        assert_eq!(access.scope, "");
    }
}
