use crate::crypto;

#[derive(sqlx::FromRow, Debug, Clone, serde::Serialize)]
pub struct SessionToken {
    pub id: i64,
    // opaque token handed to the player when it starts a login,
    // round-tripped through spotify as the oauth `state`
    pub session_token: uuid::Uuid,
    // the spotify refresh token attached by the auth callback.
    // This value is AES_256_GCM encrypted using the application
    // secret and the `refresh_nonce` generated when the value
    // was originally encrypted.
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_nonce: Option<String>,
    pub created: chrono::DateTime<chrono::Utc>,
    pub modified: chrono::DateTime<chrono::Utc>,
}

impl SessionToken {
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// The encrypted refresh token, if the login has completed
    pub fn encrypted_refresh_token(&self) -> Option<crypto::Enc> {
        match (&self.refresh_token, &self.refresh_nonce) {
            (Some(value), Some(nonce)) => Some(crypto::Enc {
                value: value.clone(),
                nonce: nonce.clone(),
            }),
            _ => None,
        }
    }
}
