use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shield_models::{Account, FailedAttempt, NewAccount};
use uuid::Uuid;

use super::PgStore;
use crate::error::{StoreError, StoreResult};
use crate::models::account::{AccountRow, ACCOUNT_COLUMNS};
use crate::store::{AccountStore, Guarded};

impl PgStore {
    async fn fetch_account(&self, sql: &str, id: Uuid) -> StoreResult<Account> {
        sqlx::query_as::<_, AccountRow>(sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StoreError::not_found("Account", id))?
            .try_into()
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        let sql = format!(
            "INSERT INTO accounts (id, username, email, credential_hash, role, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {ACCOUNT_COLUMNS}"
        );

        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.credential_hash)
            .bind(account.role.as_str())
            .bind(Utc::now())
            .fetch_one(self.pool())
            .await
            .map_err(|e| StoreError::from_write(e, "User already exists"))?;

        row.try_into()
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(email) = lower($1)");

        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(email)
            .fetch_optional(self.pool())
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Account> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        self.fetch_account(&sql, id).await
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        threshold: i32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Guarded<FailedAttempt>> {
        // `FOR UPDATE` serialises writers on the account, so the lock seen in
        // `target` is the latest committed one and the increment is skipped
        // while it is in force.
        let row = sqlx::query_as::<_, (Option<DateTime<Utc>>, Option<i32>, Option<DateTime<Utc>>)>(
            "WITH target AS (
                 SELECT id, locked_until FROM accounts WHERE id = $1 FOR UPDATE
             ),
             updated AS (
                 UPDATE accounts AS a
                 SET failed_attempt_count = a.failed_attempt_count + 1,
                     locked_until = CASE
                         WHEN a.failed_attempt_count + 1 >= $2 THEN $3
                         ELSE a.locked_until
                     END
                 FROM target
                 WHERE a.id = target.id
                   AND (target.locked_until IS NULL OR target.locked_until <= $4)
                 RETURNING a.failed_attempt_count, a.locked_until
             )
             SELECT target.locked_until, updated.failed_attempt_count, updated.locked_until
             FROM target LEFT JOIN updated ON TRUE",
        )
        .bind(id)
        .bind(threshold)
        .bind(lock_until)
        .bind(now)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| StoreError::not_found("Account", id))?;

        match row {
            (_, Some(count), locked_until) => Ok(Guarded::Applied(FailedAttempt {
                count,
                locked_until,
                newly_locked: count >= threshold,
            })),
            (Some(until), None, _) => Ok(Guarded::Locked(until)),
            (None, None, _) => Err(StoreError::Conflict(format!("account {} was not updated", id))),
        }
    }

    async fn record_success(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Guarded<Account>> {
        let row = sqlx::query_as::<_, (Option<DateTime<Utc>>, bool)>(
            "WITH target AS (
                 SELECT id, locked_until FROM accounts WHERE id = $1 FOR UPDATE
             ),
             updated AS (
                 UPDATE accounts AS a
                 SET failed_attempt_count = 0, locked_until = NULL, last_login_at = $2
                 FROM target
                 WHERE a.id = target.id
                   AND (target.locked_until IS NULL OR target.locked_until <= $2)
                 RETURNING a.id
             )
             SELECT target.locked_until, updated.id IS NOT NULL
             FROM target LEFT JOIN updated ON TRUE",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| StoreError::not_found("Account", id))?;

        match row {
            (_, true) => Ok(Guarded::Applied(self.get_account(id).await?)),
            (Some(until), false) => Ok(Guarded::Locked(until)),
            (None, false) => Err(StoreError::Conflict(format!("account {} was not updated", id))),
        }
    }

    async fn unlock_account(&self, id: Uuid) -> StoreResult<Account> {
        let sql = format!(
            "UPDATE accounts SET failed_attempt_count = 0, locked_until = NULL \
             WHERE id = $1 \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        self.fetch_account(&sql, id).await
    }
}
