//! PostgreSQL Ledger Store
//!
//! All balance changes are guarded single-statement updates
//! (`... WHERE balance >= $1 RETURNING balance`) and all status changes are
//! CAS updates (`... WHERE status = ANY($from)`), so the invariants hold across
//! any number of service instances sharing the database.

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgRow};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::LedgerError;
use super::state::TransactionStatus;
use super::store::{BalanceEffect, LedgerStore, Settlement, StatusUpdate, Transition};
use super::types::{AccountId, Transaction, TransactionDraft, TransactionId};
use crate::db::SafeRow;
use crate::money::Amount;

const TRANSACTION_COLUMNS: &str = r#"
    id, account_id, counterparty_account_id, related_transaction_id, kind, amount,
    fee, total_deduction, status, idempotency_key, external_reference, balance_after,
    error_message, metadata, retry_count, created_at, updated_at
"#;

/// PostgreSQL-backed ledger store
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction, LedgerError> {
    let id_str: String = row.column("id")?;
    let id: TransactionId = id_str
        .parse()
        .map_err(|_| LedgerError::Database(format!("Invalid transaction id: {}", id_str)))?;

    let related: Option<String> = row.column("related_transaction_id")?;
    let related_transaction_id = related
        .map(|r| {
            r.parse::<TransactionId>()
                .map_err(|_| LedgerError::Database(format!("Invalid related id: {}", r)))
        })
        .transpose()?;

    let status_id: i16 = row.column("status")?;
    let status = TransactionStatus::from_id(status_id)
        .ok_or_else(|| LedgerError::Database(format!("Invalid status ID: {}", status_id)))?;

    let kind: String = row.column("kind")?;
    let counterparty: Option<i64> = row.column("counterparty_account_id")?;
    let balance_after: Option<i64> = row.column("balance_after")?;
    let created_at: chrono::DateTime<chrono::Utc> = row.column("created_at")?;
    let updated_at: chrono::DateTime<chrono::Utc> = row.column("updated_at")?;

    Ok(Transaction {
        id,
        account_id: AccountId(row.column::<i64>("account_id")? as u64),
        counterparty_account_id: counterparty.map(|c| AccountId(c as u64)),
        related_transaction_id,
        kind: kind.parse()?,
        amount: Amount::from_storage(row.column("amount")?)?,
        fee: Amount::from_storage(row.column("fee")?)?,
        total_deduction: Amount::from_storage(row.column("total_deduction")?)?,
        status,
        idempotency_key: row.column("idempotency_key")?,
        external_reference: row.column("external_reference")?,
        balance_after: balance_after.map(Amount::from_storage).transpose()?,
        error: row.column("error_message")?,
        metadata: row.column("metadata")?,
        retry_count: row.column("retry_count")?,
        created_at: created_at.timestamp_millis(),
        updated_at: updated_at.timestamp_millis(),
    })
}

/// Map insert failures onto the ledger taxonomy
fn insert_error(e: sqlx::Error, tx: &Transaction) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return LedgerError::DuplicateOperation(tx.idempotency_key.clone());
        }
        if db_err.is_foreign_key_violation() {
            return LedgerError::AccountNotFound(tx.account_id);
        }
    }
    LedgerError::from(e)
}

async fn insert_transaction(conn: &mut PgConnection, tx: &Transaction) -> Result<(), LedgerError> {
    let sql = format!(
        "INSERT INTO transactions ({}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW(), NOW())",
        TRANSACTION_COLUMNS
    );
    sqlx::query(&sql)
        .bind(tx.id.to_string())
        .bind(tx.account_id.to_storage()?)
        .bind(tx.counterparty_account_id.map(|c| c.to_storage()).transpose()?)
        .bind(tx.related_transaction_id.map(|r| r.to_string()))
        .bind(tx.kind.as_str())
        .bind(tx.amount.to_storage()?)
        .bind(tx.fee.to_storage()?)
        .bind(tx.total_deduction.to_storage()?)
        .bind(tx.status.id())
        .bind(&tx.idempotency_key)
        .bind(&tx.external_reference)
        .bind(tx.balance_after.map(|b| b.to_storage()).transpose()?)
        .bind(&tx.error)
        .bind(&tx.metadata)
        .bind(tx.retry_count)
        .execute(&mut *conn)
        .await
        .map_err(|e| insert_error(e, tx))?;
    Ok(())
}

async fn current_balance(
    conn: &mut PgConnection,
    account: AccountId,
) -> Result<Option<Amount>, LedgerError> {
    let balance: Option<i64> = sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
        .bind(account.to_storage()?)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(balance.map(Amount::from_storage).transpose()?)
}

async fn guarded_debit(
    conn: &mut PgConnection,
    account: AccountId,
    amount: Amount,
) -> Result<Amount, LedgerError> {
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE accounts
        SET balance = balance - $1, updated_at = NOW()
        WHERE id = $2 AND balance >= $1
        RETURNING balance
        "#,
    )
    .bind(amount.to_storage()?)
    .bind(account.to_storage()?)
    .fetch_optional(&mut *conn)
    .await?;

    match balance {
        Some(b) => Ok(Amount::from_storage(b)?),
        None => match current_balance(conn, account).await? {
            Some(available) => Err(LedgerError::InsufficientFunds {
                available,
                requested: amount,
            }),
            None => Err(LedgerError::AccountNotFound(account)),
        },
    }
}

async fn guarded_credit(
    conn: &mut PgConnection,
    account: AccountId,
    amount: Amount,
) -> Result<Amount, LedgerError> {
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE accounts
        SET balance = balance + $1, updated_at = NOW()
        WHERE id = $2
        RETURNING balance
        "#,
    )
    .bind(amount.to_storage()?)
    .bind(account.to_storage()?)
    .fetch_optional(&mut *conn)
    .await?;

    match balance {
        Some(b) => Ok(Amount::from_storage(b)?),
        None => Err(LedgerError::AccountNotFound(account)),
    }
}

async fn write_fields(
    conn: &mut PgConnection,
    id: TransactionId,
    update: &StatusUpdate,
    non_terminal_only: bool,
) -> Result<bool, LedgerError> {
    let guard = if non_terminal_only {
        "AND status NOT IN ($6, $7, $8)"
    } else {
        ""
    };
    let sql = format!(
        r#"
        UPDATE transactions
        SET external_reference = COALESCE($2, external_reference),
            error_message = COALESCE($3, error_message),
            metadata = COALESCE($4, metadata),
            balance_after = COALESCE($5, balance_after),
            updated_at = NOW()
        WHERE id = $1 {}
        "#,
        guard
    );

    let mut query = sqlx::query(&sql)
        .bind(id.to_string())
        .bind(&update.external_reference)
        .bind(&update.error)
        .bind(&update.metadata)
        .bind(update.balance_after.map(|b| b.to_storage()).transpose()?);
    if non_terminal_only {
        query = query
            .bind(TransactionStatus::Success.id())
            .bind(TransactionStatus::Failed.id())
            .bind(TransactionStatus::FailedRefunded.id());
    }

    let result = query.execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn open_account(&self, account: AccountId, opening: Amount) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO accounts (id, balance) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(account.to_storage()?)
        .bind(opening.to_storage()?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_balance(&self, account: AccountId) -> Result<Amount, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        current_balance(&mut conn, account)
            .await?
            .ok_or(LedgerError::AccountNotFound(account))
    }

    async fn debit(&self, account: AccountId, amount: Amount) -> Result<Amount, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        guarded_debit(&mut conn, account, amount).await
    }

    async fn credit(&self, account: AccountId, amount: Amount) -> Result<Amount, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        guarded_credit(&mut conn, account, amount).await
    }

    async fn create_transaction(
        &self,
        draft: TransactionDraft,
    ) -> Result<Transaction, LedgerError> {
        let tx = draft.into_transaction()?;
        let mut conn = self.pool.acquire().await?;
        insert_transaction(&mut conn, &tx).await?;
        debug!(transaction_id = %tx.id, key = %tx.idempotency_key, "Transaction recorded");
        Ok(tx)
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        let sql = format!("SELECT {} FROM transactions WHERE id = $1", TRANSACTION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_transaction(&row),
            None => Err(LedgerError::TransactionNotFound(id.to_string())),
        }
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transaction>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE idempotency_key = $1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn update_transaction_status(
        &self,
        id: TransactionId,
        from: &[TransactionStatus],
        to: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<Transition, LedgerError> {
        self.settle(Settlement::new(id, from, to).with_update(update))
            .await
    }

    async fn annotate(
        &self,
        id: TransactionId,
        update: StatusUpdate,
    ) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        write_fields(&mut conn, id, &update, true).await
    }

    async fn settle(&self, settlement: Settlement) -> Result<Transition, LedgerError> {
        settlement.validate()?;
        let from: Vec<i16> = settlement.from.iter().map(|s| s.id()).collect();

        let mut db_tx = self.pool.begin().await?;

        // 1. Status CAS (also takes the row lock for the rest of the unit)
        let owner: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE transactions
            SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = ANY($3)
            RETURNING account_id
            "#,
        )
        .bind(settlement.to.id())
        .bind(settlement.transaction_id.to_string())
        .bind(&from)
        .fetch_optional(&mut *db_tx)
        .await?;

        let Some(owner) = owner else {
            db_tx.rollback().await?;
            let current = self.get_transaction(settlement.transaction_id).await?.status;
            warn!(
                transaction_id = %settlement.transaction_id,
                current = %current,
                target = %settlement.to,
                "Status CAS lost, settlement skipped"
            );
            return Ok(Transition::Skipped { current });
        };

        // 2. Guarded balance effect; an error drops db_tx, rolling back the CAS
        let effect = match settlement.effect {
            BalanceEffect::None => None,
            BalanceEffect::Debit { account, amount } => {
                Some((account, guarded_debit(&mut db_tx, account, amount).await?))
            }
            BalanceEffect::Credit { account, amount } => {
                Some((account, guarded_credit(&mut db_tx, account, amount).await?))
            }
        };

        // 3. Companion record
        let companion = match settlement.companion {
            Some(draft) => {
                let mut record = draft.into_transaction()?;
                record.status = TransactionStatus::Success;
                record.balance_after = effect
                    .filter(|(account, _)| *account == record.account_id)
                    .map(|(_, balance)| balance);
                insert_transaction(&mut db_tx, &record).await?;
                Some(record)
            }
            None => None,
        };

        // 4. Field updates
        let mut update = settlement.update;
        if let Some((account, balance)) = effect
            && account.to_storage()? == owner
        {
            update.balance_after = Some(balance);
        }
        write_fields(&mut db_tx, settlement.transaction_id, &update, false).await?;

        db_tx.commit().await?;

        Ok(Transition::Applied {
            balance: effect.map(|(_, balance)| balance),
            companion,
        })
    }

    async fn increment_retry(&self, id: TransactionId) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET retry_count = retry_count + 1, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_stale(
        &self,
        statuses: &[TransactionStatus],
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let ids: Vec<i16> = statuses.iter().map(|s| s.id()).collect();
        let sql = format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE status = ANY($1)
              AND updated_at <= NOW() - INTERVAL '1 millisecond' * $2
            ORDER BY updated_at ASC
            LIMIT $3
            "#,
            TRANSACTION_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(&ids)
            .bind(older_than.as_millis() as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_transaction).collect()
    }
}
