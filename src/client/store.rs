use std::path::{Path, PathBuf};

use crate::Result;

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StoredTokens {
    pub session_token: Option<String>,
    pub access_token: Option<String>,
}

/// Small json file holding the player's session and access tokens
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn from_config() -> Self {
        Self::new(&crate::CONFIG.player_store_path)
    }

    /// A missing or unreadable file reads as empty
    pub async fn load(&self) -> StoredTokens {
        match async_std::fs::read_to_string(&self.path).await {
            Err(_) => StoredTokens::default(),
            Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        }
    }

    pub async fn save(&self, tokens: &StoredTokens) -> Result<()> {
        let s = serde_json::to_string_pretty(tokens)
            .map_err(|e| se!("error serializing stored tokens {}", e))?;
        async_std::fs::write(&self.path, s)
            .await
            .map_err(|e| se!("error writing {:?} {}", self.path, e))?;
        Ok(())
    }

    pub async fn session_token(&self) -> Option<String> {
        self.load().await.session_token
    }

    pub async fn set_session_token(&self, token: &str) -> Result<()> {
        let mut tokens = self.load().await;
        tokens.session_token = Some(token.to_string());
        self.save(&tokens).await
    }

    pub async fn access_token(&self) -> Option<String> {
        self.load().await.access_token
    }

    pub async fn set_access_token(&self, token: &str) -> Result<()> {
        let mut tokens = self.load().await;
        tokens.access_token = Some(token.to_string());
        self.save(&tokens).await
    }
}
