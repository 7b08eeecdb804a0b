use async_mutex::Mutex;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::SessionStore;
use crate::{crypto, models, Result};

/// Keeps session tokens in process, for local runs and tests
#[derive(Default)]
pub struct MemorySessionStore {
    rows: Mutex<Vec<models::SessionToken>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row as-is, letting callers pick its timestamps
    pub async fn insert(&self, row: models::SessionToken) {
        self.rows.lock().await.push(row);
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }
}

fn latest_index(rows: &[models::SessionToken], session_token: uuid::Uuid) -> Option<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, r)| r.session_token == session_token)
        .max_by_key(|(_, r)| (r.created, r.id))
        .map(|(i, _)| i)
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session_token: uuid::Uuid) -> Result<models::SessionToken> {
        let mut rows = self.rows.lock().await;
        let now = Utc::now();
        let id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let row = models::SessionToken {
            id,
            session_token,
            refresh_token: None,
            refresh_nonce: None,
            created: now,
            modified: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|r| r.created > cutoff || r.has_refresh_token());
        Ok((before - rows.len()) as u64)
    }

    async fn find(&self, session_token: uuid::Uuid) -> Result<Option<models::SessionToken>> {
        let rows = self.rows.lock().await;
        Ok(latest_index(&rows, session_token).map(|i| rows[i].clone()))
    }

    async fn attach_refresh_token(
        &self,
        session_token: uuid::Uuid,
        refresh_token: &crypto::Enc,
    ) -> Result<Option<models::SessionToken>> {
        let mut rows = self.rows.lock().await;
        let i = match latest_index(&rows, session_token) {
            Some(i) => i,
            None => return Ok(None),
        };
        let row = &mut rows[i];
        row.refresh_token = Some(refresh_token.value.clone());
        row.refresh_nonce = Some(refresh_token.nonce.clone());
        row.modified = Utc::now();
        Ok(Some(row.clone()))
    }
}
