use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::SessionStore;
use crate::{crypto, models, Result, LOG};

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub async fn connect(db_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .map_err(|e| se!("error connecting to database {:?}", e))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| se!("error running migrations {:?}", e))?;
        slog::info!(LOG, "database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session_token: uuid::Uuid) -> Result<models::SessionToken> {
        let row = sqlx::query_as::<_, models::SessionToken>(
            "
            insert into spot_remote.session_tokens (session_token)
            values ($1)
            returning *
            ",
        )
        .bind(session_token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| se!("error inserting session token {:?}", e))?;
        Ok(row)
    }

    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query(
            "
            delete from spot_remote.session_tokens
            where created <= $1 and refresh_token is null
            ",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| se!("error deleting stale session tokens {:?}", e))?;
        Ok(done.rows_affected())
    }

    async fn find(&self, session_token: uuid::Uuid) -> Result<Option<models::SessionToken>> {
        let row = sqlx::query_as::<_, models::SessionToken>(
            "
            select * from spot_remote.session_tokens
            where session_token = $1
            order by created desc, id desc
            limit 1
            ",
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| se!("error fetching session token {:?}", e))?;
        Ok(row)
    }

    async fn attach_refresh_token(
        &self,
        session_token: uuid::Uuid,
        refresh_token: &crypto::Enc,
    ) -> Result<Option<models::SessionToken>> {
        let row = sqlx::query_as::<_, models::SessionToken>(
            "
            update spot_remote.session_tokens
                set refresh_token = $1, refresh_nonce = $2, modified = now()
                where id = (
                    select id from spot_remote.session_tokens
                    where session_token = $3
                    order by created desc, id desc
                    limit 1
                )
            returning *
            ",
        )
        .bind(&refresh_token.value)
        .bind(&refresh_token.nonce)
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| se!("error attaching refresh token {:?}", e))?;
        Ok(row)
    }
}
