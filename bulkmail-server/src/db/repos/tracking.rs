//! Open-tracking repository

use sqlx::PgPool;
use uuid::Uuid;

use super::DbError;

/// Tracking repository
pub struct TrackingRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> TrackingRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record an open for the recipient owning `token` and refresh the
    /// send's distinct-open counter.
    ///
    /// Returns false when the token matches no recipient.
    pub async fn record_open(
        &self,
        token: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO opens (send_id, contact_id, opened_at, ip_address, user_agent)
            SELECT sr.send_id, sr.contact_id, NOW(), $1, $2
            FROM send_recipients sr
            WHERE sr.tracking_token = $3
            "#,
        )
        .bind(ip_address)
        .bind(user_agent)
        .bind(token)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE sends
            SET opened_count = (
                SELECT COUNT(DISTINCT contact_id)
                FROM opens
                WHERE send_id = sends.id
            )
            WHERE id = (SELECT send_id FROM send_recipients WHERE tracking_token = $1)
            "#,
        )
        .bind(token)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn unknown_token_records_nothing() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations failed");

        let recorded = TrackingRepo::new(&pool)
            .record_open(Uuid::new_v4(), Some("127.0.0.1"), None)
            .await
            .unwrap();
        assert!(!recorded);
    }
}
