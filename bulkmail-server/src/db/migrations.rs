//! Schema migrations
//!
//! Every statement is idempotent, so this runs on each startup.

use sqlx::PgPool;

/// Create all tables and indexes if missing.
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            smtp_email TEXT,
            smtp_password TEXT,
            smtp_server TEXT NOT NULL DEFAULT 'smtp.gmail.com',
            smtp_port INTEGER NOT NULL DEFAULT 587,
            smtp_tls BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id BIGSERIAL PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lists (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS list_contacts (
            contact_id BIGINT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
            list_id BIGINT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
            added_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (contact_id, list_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sends (
            id BIGSERIAL PRIMARY KEY,
            sent_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            user_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
            list_id BIGINT REFERENCES lists(id) ON DELETE SET NULL,
            total_recipients INTEGER NOT NULL DEFAULT 0,
            sent_count INTEGER NOT NULL DEFAULT 0,
            bounced_count INTEGER NOT NULL DEFAULT 0,
            opened_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'sending',
            finished_at TIMESTAMPTZ,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS send_recipients (
            id BIGSERIAL PRIMARY KEY,
            send_id BIGINT NOT NULL REFERENCES sends(id) ON DELETE CASCADE,
            contact_id BIGINT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
            sent_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            status TEXT NOT NULL,
            tracking_token UUID UNIQUE,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bounces (
            id BIGSERIAL PRIMARY KEY,
            send_id BIGINT NOT NULL REFERENCES sends(id) ON DELETE CASCADE,
            contact_id BIGINT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
            bounced_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            reason TEXT NOT NULL,
            error_code TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS opens (
            id BIGSERIAL PRIMARY KEY,
            send_id BIGINT NOT NULL REFERENCES sends(id) ON DELETE CASCADE,
            contact_id BIGINT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
            opened_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            ip_address TEXT,
            user_agent TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    create_indexes(pool).await?;

    tracing::info!("Migrations complete");
    Ok(())
}

async fn create_indexes(pool: &PgPool) -> Result<(), sqlx::Error> {
    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_list_contacts_list ON list_contacts(list_id)",
        "CREATE INDEX IF NOT EXISTS idx_sends_sent_at ON sends(sent_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_sends_status ON sends(status)",
        "CREATE INDEX IF NOT EXISTS idx_send_recipients_send ON send_recipients(send_id)",
        "CREATE INDEX IF NOT EXISTS idx_bounces_send_contact ON bounces(send_id, contact_id)",
        "CREATE INDEX IF NOT EXISTS idx_opens_send_contact ON opens(send_id, contact_id)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
