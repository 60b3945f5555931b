//! List repository
//!
//! Mailing lists and their memberships:
//! - create: upsert with ON CONFLICT (idempotent)
//! - import: screened addresses upserted and linked in one transaction

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use super::{Contact, DbError};
use crate::models::{EmailAddress, ImportBatch, ListName};

/// List record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MailingList {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Counters reported by a bulk import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Entries received
    pub total: usize,
    /// Newly linked to the list
    pub imported: usize,
    /// Repeated within the payload
    pub duplicates: usize,
    /// Failed address validation
    pub malformed: usize,
    /// Already members of the list
    pub already_in_list: usize,
}

impl ImportSummary {
    /// Start a summary from the screening step; DB counters follow.
    pub fn from_screening(total: usize, batch: &ImportBatch) -> Self {
        Self {
            total,
            malformed: batch.malformed,
            duplicates: batch.duplicates,
            ..Default::default()
        }
    }
}

/// List repository
pub struct ListRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ListRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a list, returning the existing one on a name conflict.
    pub async fn create(&self, name: ListName) -> Result<MailingList, DbError> {
        let list = sqlx::query_as::<_, MailingList>(
            r#"
            INSERT INTO lists (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name, created_at
            "#,
        )
        .bind(name.as_str())
        .fetch_one(self.pool)
        .await?;

        Ok(list)
    }

    /// All lists ordered by name.
    pub async fn list(&self) -> Result<Vec<MailingList>, DbError> {
        let lists = sqlx::query_as::<_, MailingList>(
            "SELECT id, name, created_at FROM lists ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(lists)
    }

    async fn ensure_exists(&self, list_id: i64) -> Result<(), DbError> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM lists WHERE id = $1)")
            .bind(list_id)
            .fetch_one(self.pool)
            .await?;

        if exists.0 {
            Ok(())
        } else {
            Err(DbError::not_found("list", list_id))
        }
    }

    /// Upsert a contact and link it to the list (link conflicts ignored).
    pub async fn add_contact(&self, list_id: i64, email: &EmailAddress) -> Result<Contact, DbError> {
        self.ensure_exists(list_id).await?;

        let mut tx = self.pool.begin().await?;

        let contact = upsert_contact(&mut tx, email).await?;
        link(&mut tx, contact.id, list_id).await?;

        tx.commit().await?;
        Ok(contact)
    }

    /// Members of a list ordered by email.
    pub async fn contacts(&self, list_id: i64) -> Result<Vec<Contact>, DbError> {
        let contacts = sqlx::query_as::<_, Contact>(
            r#"
            SELECT c.id, c.email
            FROM contacts c
            JOIN list_contacts lc ON c.id = lc.contact_id
            WHERE lc.list_id = $1
            ORDER BY c.email
            "#,
        )
        .bind(list_id)
        .fetch_all(self.pool)
        .await?;

        Ok(contacts)
    }

    /// Number of members in a list.
    pub async fn count(&self, list_id: i64) -> Result<i64, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM list_contacts WHERE list_id = $1")
                .bind(list_id)
                .fetch_one(self.pool)
                .await?;

        Ok(count)
    }

    /// Delete a list and its memberships.
    ///
    /// Idempotent - returns Ok even if already deleted.
    pub async fn delete(&self, list_id: i64) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM list_contacts WHERE list_id = $1")
            .bind(list_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM lists WHERE id = $1")
            .bind(list_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Unlink a contact from a list. The contact itself is kept.
    pub async fn remove_contact(&self, list_id: i64, contact_id: i64) -> Result<(), DbError> {
        sqlx::query("DELETE FROM list_contacts WHERE list_id = $1 AND contact_id = $2")
            .bind(list_id)
            .bind(contact_id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Bulk-import raw addresses into a list.
    pub async fn import(&self, list_id: i64, raw: &[String]) -> Result<ImportSummary, DbError> {
        self.ensure_exists(list_id).await?;

        let batch = ImportBatch::screen(raw);
        let mut summary = ImportSummary::from_screening(raw.len(), &batch);

        let mut tx = self.pool.begin().await?;
        for email in &batch.accepted {
            let contact = upsert_contact(&mut tx, email).await?;
            if link(&mut tx, contact.id, list_id).await? {
                summary.imported += 1;
            } else {
                summary.already_in_list += 1;
            }
        }
        tx.commit().await?;

        tracing::info!(
            list_id,
            total = summary.total,
            imported = summary.imported,
            malformed = summary.malformed,
            "import finished"
        );
        Ok(summary)
    }
}

async fn upsert_contact(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    email: &EmailAddress,
) -> Result<Contact, DbError> {
    let contact = sqlx::query_as::<_, Contact>(
        r#"
        INSERT INTO contacts (email) VALUES ($1)
        ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
        RETURNING id, email
        "#,
    )
    .bind(email.as_str())
    .fetch_one(&mut **tx)
    .await?;

    Ok(contact)
}

/// Link a contact to a list; false when the link already existed.
async fn link(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    contact_id: i64,
    list_id: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO list_contacts (contact_id, list_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(contact_id)
    .bind(list_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_starts_from_screening() {
        let raw = ["a@x.com", "bad", "a@x.com", "b@x.com"];
        let batch = ImportBatch::screen(&raw);
        let summary = ImportSummary::from_screening(raw.len(), &batch);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.imported + summary.already_in_list, 0);
    }

    #[test]
    fn summary_serializes_field_names() {
        let json = serde_json::to_value(ImportSummary::default()).unwrap();
        for key in ["total", "imported", "duplicates", "malformed", "already_in_list"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    // Integration tests - run with DATABASE_URL set
    // cargo test -p bulkmail-server -- --ignored

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations failed");
        pool
    }

    fn unique(prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn create_list_idempotent() {
        let pool = test_pool().await;
        let repo = ListRepo::new(&pool);
        let name = unique("list");

        let first = repo.create(ListName::new(&name).unwrap()).await.unwrap();
        let second = repo.create(ListName::new(&name).unwrap()).await.unwrap();

        assert_eq!(first.id, second.id);
        repo.delete(first.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn import_counts_existing_members() {
        let pool = test_pool().await;
        let repo = ListRepo::new(&pool);
        let list = repo.create(ListName::new(&unique("import")).unwrap()).await.unwrap();

        let member = format!("{}@example.com", unique("member"));
        let fresh = format!("{}@example.com", unique("fresh"));
        repo.add_contact(list.id, &EmailAddress::parse(&member).unwrap())
            .await
            .unwrap();

        let raw = vec![member.clone(), fresh.clone(), fresh.to_uppercase(), "junk".into()];
        let summary = repo.import(list.id, &raw).await.unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                total: 4,
                imported: 1,
                duplicates: 1,
                malformed: 1,
                already_in_list: 1,
            }
        );
        assert_eq!(repo.count(list.id).await.unwrap(), 2);
        repo.delete(list.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn add_contact_to_missing_list() {
        let pool = test_pool().await;
        let email = EmailAddress::parse("nobody@example.com").unwrap();

        let err = ListRepo::new(&pool).add_contact(i64::MAX, &email).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { resource: "list", .. }));
    }
}
