//! Contact repository

use serde::Serialize;
use sqlx::{FromRow, PgPool};

use super::DbError;

/// Contact record from database
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Contact {
    pub id: i64,
    pub email: String,
}

/// Contact repository
pub struct ContactRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ContactRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every contact, ordered by email.
    pub async fn list_all(&self) -> Result<Vec<Contact>, DbError> {
        let contacts =
            sqlx::query_as::<_, Contact>("SELECT id, email FROM contacts ORDER BY email")
                .fetch_all(self.pool)
                .await?;

        Ok(contacts)
    }
}
