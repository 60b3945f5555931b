//! User repository
//!
//! Users double as sender accounts: each may carry SMTP credentials.
//! Password hashes and SMTP passwords never leave this module except
//! through `UserRecord`, which is not serializable.

use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::DbError;
use crate::mail::SmtpAccount;
use crate::models::Username;

/// Columns safe to return to clients
const PROFILE_COLUMNS: &str = "id, username, smtp_email, smtp_server, smtp_port, smtp_tls";

/// Full user row, including secrets
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub smtp_email: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_server: String,
    pub smtp_port: i32,
    pub smtp_tls: bool,
}

impl UserRecord {
    /// Public view without secrets.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            smtp_email: self.smtp_email.clone(),
            smtp_server: self.smtp_server.clone(),
            smtp_port: self.smtp_port,
            smtp_tls: self.smtp_tls,
        }
    }

    /// SMTP account for sending, if both address and password are configured.
    pub fn smtp_account(&self) -> Option<SmtpAccount> {
        let email = self.smtp_email.as_deref().filter(|s| !s.is_empty())?;
        let password = self.smtp_password.as_deref().filter(|s| !s.is_empty())?;

        Some(SmtpAccount {
            email: email.to_owned(),
            password: password.to_owned(),
            server: self.smtp_server.clone(),
            port: u16::try_from(self.smtp_port).unwrap_or(587),
            tls: self.smtp_tls,
        })
    }
}

/// User without secrets
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub smtp_email: Option<String>,
    pub smtp_server: String,
    pub smtp_port: i32,
    pub smtp_tls: bool,
}

/// SMTP settings written together
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub email: Option<String>,
    pub password: Option<String>,
    pub server: String,
    pub port: i32,
    pub tls: bool,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            email: None,
            password: None,
            server: "smtp.gmail.com".to_string(),
            port: 587,
            tls: true,
        }
    }
}

/// New user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: Username,
    pub password_hash: String,
    pub smtp: SmtpSettings,
}

/// Partial update; `None` leaves a column untouched, `Some(None)` on the
/// SMTP credentials sets them to NULL
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub username: Username,
    pub password_hash: Option<String>,
    pub smtp_email: Option<Option<String>>,
    pub smtp_password: Option<Option<String>>,
    pub smtp_server: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_tls: Option<bool>,
}

/// User repository
pub struct UserRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Full record by username (for login).
    pub async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, DbError> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self.pool)
            .await?;

        Ok(user)
    }

    /// Full record by id (for sending).
    pub async fn find(&self, id: i64) -> Result<Option<UserRecord>, DbError> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<UserProfile>, DbError> {
        let users = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(users)
    }

    pub async fn get(&self, id: i64) -> Result<UserProfile, DbError> {
        sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("user", id))
    }

    /// Insert a user; `Conflict` when the username is taken.
    pub async fn create(&self, user: NewUser) -> Result<UserProfile, DbError> {
        sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            INSERT INTO users
                (username, password_hash, smtp_email, smtp_password, smtp_server, smtp_port, smtp_tls)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user.username.as_str())
        .bind(&user.password_hash)
        .bind(&user.smtp.email)
        .bind(&user.smtp.password)
        .bind(&user.smtp.server)
        .bind(user.smtp.port)
        .bind(user.smtp.tls)
        .fetch_one(self.pool)
        .await
        .map_err(|e| DbError::conflict_or(e, "user"))
    }

    /// Update the username plus any provided field.
    pub async fn update(&self, id: i64, update: UserUpdate) -> Result<UserProfile, DbError> {
        let mut query = QueryBuilder::<Postgres>::new("UPDATE users SET username = ");
        query.push_bind(update.username.as_str().to_owned());

        if let Some(hash) = update.password_hash {
            query.push(", password_hash = ").push_bind(hash);
        }
        if let Some(email) = update.smtp_email {
            query.push(", smtp_email = ").push_bind(email);
        }
        if let Some(password) = update.smtp_password {
            query.push(", smtp_password = ").push_bind(password);
        }
        if let Some(server) = update.smtp_server {
            query.push(", smtp_server = ").push_bind(server);
        }
        if let Some(port) = update.smtp_port {
            query.push(", smtp_port = ").push_bind(port);
        }
        if let Some(tls) = update.smtp_tls {
            query.push(", smtp_tls = ").push_bind(tls);
        }

        query.push(" WHERE id = ").push_bind(id);
        query.push(" RETURNING ").push(PROFILE_COLUMNS);

        query
            .build_query_as::<UserProfile>()
            .fetch_optional(self.pool)
            .await
            .map_err(|e| DbError::conflict_or(e, "user"))?
            .ok_or_else(|| DbError::not_found("user", id))
    }

    /// Replace all SMTP settings at once.
    pub async fn update_smtp(&self, id: i64, smtp: SmtpSettings) -> Result<UserProfile, DbError> {
        sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            UPDATE users
            SET smtp_email = $1, smtp_password = $2, smtp_server = $3,
                smtp_port = $4, smtp_tls = $5
            WHERE id = $6
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(&smtp.email)
        .bind(&smtp.password)
        .bind(&smtp.server)
        .bind(smtp.port)
        .bind(smtp.tls)
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("user", id))
    }

    /// Delete a user; `NotFound` when nothing was deleted.
    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> UserRecord {
        UserRecord {
            id: 7,
            username: "laura".into(),
            password_hash: "$argon2id$...".into(),
            smtp_email: Some("laura@example.com".into()),
            smtp_password: Some("app-password".into()),
            smtp_server: "smtp.gmail.com".into(),
            smtp_port: 587,
            smtp_tls: true,
        }
    }

    #[test]
    fn smtp_account_requires_both_credentials() {
        let user = record();
        let account = user.smtp_account().unwrap();
        assert_eq!(account.email, "laura@example.com");
        assert_eq!(account.port, 587);

        let no_password = UserRecord {
            smtp_password: Some(String::new()),
            ..record()
        };
        assert!(no_password.smtp_account().is_none());

        let no_email = UserRecord {
            smtp_email: None,
            ..record()
        };
        assert!(no_email.smtp_account().is_none());
    }

    #[test]
    fn profile_omits_secrets() {
        let json = serde_json::to_value(record().profile()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("smtp_password").is_none());
        assert_eq!(json["username"], "laura");
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn duplicate_username_conflicts() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations failed");
        let repo = UserRepo::new(&pool);

        let name = format!("user-{}", uuid::Uuid::new_v4().simple());
        let new_user = || NewUser {
            username: Username::new(&name).unwrap(),
            password_hash: "hash".into(),
            smtp: SmtpSettings::default(),
        };

        let created = repo.create(new_user()).await.unwrap();
        let err = repo.create(new_user()).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { resource: "user" }));

        repo.delete(created.id).await.unwrap();
        assert!(matches!(
            repo.delete(created.id).await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }
}
