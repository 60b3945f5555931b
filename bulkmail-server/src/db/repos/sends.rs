//! Send repository
//!
//! A send is one campaign run against one list. This repository writes
//! the run's lifecycle (sending -> completed | error), one outcome row per
//! recipient, and answers the reporting queries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::DbError;

/// Send lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Sending,
    Completed,
    Error,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Delivery outcome of one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientOutcome {
    Sent { tracking_token: Uuid },
    Bounced { reason: String, smtp_code: Option<u16> },
}

impl RecipientOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::Bounced { .. } => "bounced",
        }
    }
}

/// Values for a new send row
#[derive(Debug, Clone)]
pub struct NewSend {
    pub subject: String,
    pub body: String,
    /// First sender; the row keeps one owner for reporting
    pub user_id: i64,
    pub list_id: i64,
    pub total_recipients: i32,
}

/// Send row joined with sender and list names
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SendRecord {
    pub id: i64,
    pub sent_at: DateTime<Utc>,
    pub subject: String,
    pub body: String,
    pub user_id: Option<i64>,
    pub list_id: Option<i64>,
    pub total_recipients: i32,
    pub sent_count: i32,
    pub bounced_count: i32,
    pub opened_count: i32,
    pub status: String,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub username: Option<String>,
    pub list_name: Option<String>,
}

/// Per-recipient row for the detail view
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecipientRow {
    pub id: i64,
    pub send_id: i64,
    pub contact_id: i64,
    pub email: String,
    pub sent_at: DateTime<Utc>,
    pub status: String,
    pub tracking_token: Option<Uuid>,
    pub error_message: Option<String>,
    pub opened: bool,
    pub bounced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMetrics {
    pub total_opens: i64,
}

/// Full detail of one send
#[derive(Debug, Clone, Serialize)]
pub struct SendDetail {
    pub send: SendRecord,
    pub recipients: Vec<RecipientRow>,
    pub metrics: SendMetrics,
}

#[derive(Debug, Clone, FromRow)]
struct SummaryRow {
    id: i64,
    sent_at: DateTime<Utc>,
    subject: String,
    sent_count: i32,
    opened_count: i32,
    status: String,
    sender: Option<String>,
    list_name: Option<String>,
}

/// Row of the recent-sends listing
#[derive(Debug, Clone, Serialize)]
pub struct SendSummary {
    pub id: i64,
    pub sent_at: DateTime<Utc>,
    pub subject: String,
    pub sent_count: i32,
    pub opened_count: i32,
    /// Whole percent of delivered messages opened
    pub open_rate: i64,
    pub sender: String,
    pub list_name: Option<String>,
    pub status: String,
}

impl From<SummaryRow> for SendSummary {
    fn from(r: SummaryRow) -> Self {
        Self {
            id: r.id,
            sent_at: r.sent_at,
            subject: r.subject,
            sent_count: r.sent_count,
            opened_count: r.opened_count,
            open_rate: open_rate(r.sent_count, r.opened_count),
            sender: r.sender.unwrap_or_else(|| "System".to_string()),
            list_name: r.list_name,
            status: r.status,
        }
    }
}

/// Aggregates over completed sends
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SendStats {
    pub total_sends: i64,
    pub total_recipients: i64,
    pub delivered: i64,
    pub bounced: i64,
    pub opened: i64,
    /// Mean per-send open rate in percent; `None` without deliveries
    pub avg_open_rate: Option<f64>,
}

/// Compact row of the most recent completed sends
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecentCompleted {
    pub sent_at: DateTime<Utc>,
    pub subject: String,
    pub sent_count: i32,
    pub opened_count: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendOverview {
    pub general: SendStats,
    pub recent: Vec<RecentCompleted>,
}

/// Rounded percentage of opened over sent; 0 when nothing was sent.
pub fn open_rate(sent: i32, opened: i32) -> i64 {
    if sent <= 0 {
        return 0;
    }
    (f64::from(opened) / f64::from(sent) * 100.0).round() as i64
}

/// Send repository
pub struct SendRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> SendRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a send in `sending` state and return its id.
    pub async fn open(&self, send: &NewSend) -> Result<i64, DbError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO sends (sent_at, subject, body, user_id, list_id, total_recipients, status)
            VALUES (NOW(), $1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&send.subject)
        .bind(&send.body)
        .bind(send.user_id)
        .bind(send.list_id)
        .bind(send.total_recipients)
        .bind(SendStatus::Sending.as_str())
        .fetch_one(self.pool)
        .await?;

        Ok(id)
    }

    /// Record one recipient's outcome.
    ///
    /// A bounce with an SMTP reply code also gets a `bounces` row; both
    /// rows commit together.
    pub async fn record(
        &self,
        send_id: i64,
        contact_id: i64,
        outcome: &RecipientOutcome,
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        match outcome {
            RecipientOutcome::Sent { tracking_token } => {
                sqlx::query(
                    r#"
                    INSERT INTO send_recipients (send_id, contact_id, sent_at, status, tracking_token)
                    VALUES ($1, $2, NOW(), $3, $4)
                    "#,
                )
                .bind(send_id)
                .bind(contact_id)
                .bind(outcome.status())
                .bind(tracking_token)
                .execute(&mut *tx)
                .await?;
            }
            RecipientOutcome::Bounced { reason, smtp_code } => {
                sqlx::query(
                    r#"
                    INSERT INTO send_recipients (send_id, contact_id, sent_at, status, error_message)
                    VALUES ($1, $2, NOW(), $3, $4)
                    "#,
                )
                .bind(send_id)
                .bind(contact_id)
                .bind(outcome.status())
                .bind(reason)
                .execute(&mut *tx)
                .await?;

                if let Some(code) = smtp_code {
                    sqlx::query(
                        r#"
                        INSERT INTO bounces (send_id, contact_id, bounced_at, reason, error_code)
                        VALUES ($1, $2, NOW(), $3, $4)
                        "#,
                    )
                    .bind(send_id)
                    .bind(contact_id)
                    .bind(reason)
                    .bind(code.to_string())
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Mark a send completed with its final counters.
    pub async fn complete(&self, send_id: i64, sent: i32, bounced: i32) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE sends
            SET status = $1, finished_at = NOW(), sent_count = $2, bounced_count = $3
            WHERE id = $4
            "#,
        )
        .bind(SendStatus::Completed.as_str())
        .bind(sent)
        .bind(bounced)
        .bind(send_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Mark a send failed.
    pub async fn fail(&self, send_id: i64, message: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE sends SET status = $1, error_message = $2 WHERE id = $3")
            .bind(SendStatus::Error.as_str())
            .bind(message)
            .bind(send_id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Most recent sends, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<SendSummary>, DbError> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT s.id, s.sent_at, s.subject, s.sent_count, s.opened_count, s.status,
                   u.username AS sender, l.name AS list_name
            FROM sends s
            LEFT JOIN users u ON s.user_id = u.id
            LEFT JOIN lists l ON s.list_id = l.id
            ORDER BY s.sent_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(SendSummary::from).collect())
    }

    /// One send with its recipients and open count.
    pub async fn detail(&self, send_id: i64) -> Result<SendDetail, DbError> {
        let send = sqlx::query_as::<_, SendRecord>(
            r#"
            SELECT s.*, u.username, l.name AS list_name
            FROM sends s
            LEFT JOIN users u ON s.user_id = u.id
            LEFT JOIN lists l ON s.list_id = l.id
            WHERE s.id = $1
            "#,
        )
        .bind(send_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("send", send_id))?;

        let recipients = sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT sr.id, sr.send_id, sr.contact_id, c.email, sr.sent_at, sr.status,
                   sr.tracking_token, sr.error_message,
                   EXISTS(SELECT 1 FROM opens o
                          WHERE o.contact_id = sr.contact_id AND o.send_id = sr.send_id) AS opened,
                   EXISTS(SELECT 1 FROM bounces b
                          WHERE b.contact_id = sr.contact_id AND b.send_id = sr.send_id) AS bounced
            FROM send_recipients sr
            JOIN contacts c ON sr.contact_id = c.id
            WHERE sr.send_id = $1
            ORDER BY sr.sent_at DESC
            "#,
        )
        .bind(send_id)
        .fetch_all(self.pool)
        .await?;

        let (total_opens,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM opens WHERE send_id = $1")
            .bind(send_id)
            .fetch_one(self.pool)
            .await?;

        Ok(SendDetail {
            send,
            recipients,
            metrics: SendMetrics { total_opens },
        })
    }

    /// Aggregates over completed sends plus the five latest of them.
    pub async fn overview(&self) -> Result<SendOverview, DbError> {
        let general = sqlx::query_as::<_, SendStats>(
            r#"
            SELECT
                COUNT(*) AS total_sends,
                COALESCE(SUM(total_recipients), 0) AS total_recipients,
                COALESCE(SUM(sent_count), 0) AS delivered,
                COALESCE(SUM(bounced_count), 0) AS bounced,
                COALESCE(SUM(opened_count), 0) AS opened,
                AVG(opened_count::float8 / NULLIF(sent_count, 0)) * 100 AS avg_open_rate
            FROM sends
            WHERE status = $1
            "#,
        )
        .bind(SendStatus::Completed.as_str())
        .fetch_one(self.pool)
        .await?;

        let recent = sqlx::query_as::<_, RecentCompleted>(
            r#"
            SELECT sent_at, subject, sent_count, opened_count
            FROM sends
            WHERE status = $1
            ORDER BY sent_at DESC
            LIMIT 5
            "#,
        )
        .bind(SendStatus::Completed.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(SendOverview { general, recent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rate_rounds() {
        assert_eq!(open_rate(0, 0), 0);
        assert_eq!(open_rate(0, 5), 0);
        assert_eq!(open_rate(3, 1), 33);
        assert_eq!(open_rate(3, 2), 67);
        assert_eq!(open_rate(200, 200), 100);
    }

    #[test]
    fn summary_defaults_sender() {
        let row = SummaryRow {
            id: 1,
            sent_at: Utc::now(),
            subject: "Octubre".into(),
            sent_count: 10,
            opened_count: 4,
            status: "completed".into(),
            sender: None,
            list_name: Some("clientes".into()),
        };

        let summary = SendSummary::from(row);
        assert_eq!(summary.sender, "System");
        assert_eq!(summary.open_rate, 40);
    }

    #[test]
    fn outcome_status_strings() {
        let sent = RecipientOutcome::Sent {
            tracking_token: Uuid::new_v4(),
        };
        let bounced = RecipientOutcome::Bounced {
            reason: "550 mailbox unavailable".into(),
            smtp_code: Some(550),
        };
        assert_eq!(sent.status(), "sent");
        assert_eq!(bounced.status(), "bounced");
        assert_eq!(SendStatus::Error.as_str(), "error");
    }
}
