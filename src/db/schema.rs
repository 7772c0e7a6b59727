//! Ledger schema bootstrap
//!
//! `balance >= 0` and `UNIQUE (idempotency_key)` are enforced by the database
//! so that the guarantees hold for every process sharing it.

use sqlx::PgPool;

pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          BIGINT PRIMARY KEY,
    balance     BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id                       TEXT PRIMARY KEY,
    account_id               BIGINT NOT NULL REFERENCES accounts (id),
    counterparty_account_id  BIGINT,
    related_transaction_id   TEXT,
    kind                     TEXT NOT NULL,
    amount                   BIGINT NOT NULL CHECK (amount > 0),
    fee                      BIGINT NOT NULL DEFAULT 0 CHECK (fee >= 0),
    total_deduction          BIGINT NOT NULL CHECK (total_deduction >= 0),
    status                   SMALLINT NOT NULL,
    idempotency_key          TEXT NOT NULL,
    external_reference       TEXT,
    balance_after            BIGINT,
    error_message            TEXT,
    metadata                 JSONB NOT NULL DEFAULT 'null'::jsonb,
    retry_count              INTEGER NOT NULL DEFAULT 0,
    created_at               TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at               TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT transactions_idempotency_key_key UNIQUE (idempotency_key)
)
"#;

pub const CREATE_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS transactions_status_updated_idx
    ON transactions (status, updated_at)
"#;

pub const CREATE_ACCOUNT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS transactions_account_idx
    ON transactions (account_id, created_at)
"#;

/// Create ledger tables and indexes if missing
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Ensuring ledger schema");

    for ddl in [
        CREATE_ACCOUNTS_TABLE,
        CREATE_TRANSACTIONS_TABLE,
        CREATE_STATUS_INDEX,
        CREATE_ACCOUNT_INDEX,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}
