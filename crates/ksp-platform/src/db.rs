use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

pub async fn connect_database(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connecting to postgres")?;

    Ok(pool)
}

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        id UUID PRIMARY KEY,
        member_code TEXT UNIQUE,
        full_name TEXT NOT NULL,
        phone TEXT NOT NULL DEFAULT '',
        address TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'pending',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS loans (
        id UUID PRIMARY KEY,
        member_id UUID NOT NULL REFERENCES profiles (id),
        amount NUMERIC NOT NULL CHECK (amount > 0),
        term_months INTEGER NOT NULL CHECK (term_months > 0),
        monthly_rate NUMERIC NOT NULL CHECK (monthly_rate >= 0),
        start_date DATE NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        monthly_payment NUMERIC NOT NULL,
        total_payment NUMERIC NOT NULL,
        remaining_amount NUMERIC NOT NULL CHECK (remaining_amount <= total_payment),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id UUID PRIMARY KEY,
        member_id UUID NOT NULL,
        date DATE NOT NULL,
        description TEXT NOT NULL,
        type TEXT NOT NULL,
        amount NUMERIC NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS savings (
        member_id UUID NOT NULL,
        kind TEXT NOT NULL,
        balance NUMERIC NOT NULL DEFAULT 0,
        PRIMARY KEY (member_id, kind)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS member_code_counters (
        year INTEGER PRIMARY KEY,
        last_value INTEGER NOT NULL
    )
    "#,
];

/// Creates the tables the store reads and writes when they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("applying schema")?;
    }
    info!("database schema ready");
    Ok(())
}
