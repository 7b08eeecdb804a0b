/*!
Persistence for pending and completed logins
*/
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{crypto, models, Result, CONFIG, LOG};

mod memory;
mod pg;

pub use memory::MemorySessionStore;
pub use pg::PgSessionStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new pending login with no refresh token
    async fn create(&self, session_token: uuid::Uuid) -> Result<models::SessionToken>;

    /// Delete pending logins created at or before `cutoff` that never
    /// received a refresh token. Completed logins are kept.
    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// The most recent row for `session_token`
    async fn find(&self, session_token: uuid::Uuid) -> Result<Option<models::SessionToken>>;

    /// Attach an encrypted refresh token to the most recent row for
    /// `session_token`, returning `None` when there isn't one.
    async fn attach_refresh_token(
        &self,
        session_token: uuid::Uuid,
        refresh_token: &crypto::Enc,
    ) -> Result<Option<models::SessionToken>>;
}

/// The creation time before which pending logins are considered stale
pub fn stale_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - chrono::Duration::seconds(CONFIG.session_token_ttl_seconds as i64)
}

/// Connect the store selected by `DATABASE_URL`
pub async fn connect() -> Result<Arc<dyn SessionStore>> {
    if CONFIG.uses_memory_store() {
        slog::warn!(LOG, "using in-memory session store, logins won't survive restarts");
        return Ok(Arc::new(MemorySessionStore::new()));
    }
    let store = PgSessionStore::connect(&CONFIG.db_url).await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}
