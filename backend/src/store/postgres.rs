//! Postgres store
//!
//! Plain runtime queries (`query_as::<_, T>`) so the crate builds without a
//! live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::{PortfolioTotals, RepaymentRecord, Store, StoreResult};
use crate::loan::{
    Admission, Loan, LoanCategory, LoanDecisionUpdate, LoanFilter, LoanRepayment, LoanStatus,
    NewLoan, RepaymentOutcome,
};
use crate::models::{KycStatus, NewUser, User};
use crate::services::credit_ledger::within_ceiling;

const USED_CREDIT_SQL: &str = r#"
    SELECT COALESCE(SUM(amount), 0)
    FROM loans
    WHERE user_id = $1 AND status IN ('pending', 'approved')
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let user = user.into_user(Utc::now());
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, full_name, email, phone, password_hash, bvn, bank_account,
                id_type, kyc_status, is_flagged, is_admin, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(&user.bvn)
        .bind(&user.bank_account)
        .bind(&user.id_type)
        .bind(user.kyc_status)
        .bind(user.is_flagged)
        .bind(user.is_admin)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_identifier(
        &self,
        identifier: &str,
        admins_only: bool,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE (id::text = $1 OR LOWER(email) = LOWER($1) OR phone = $1)
              AND (is_admin OR NOT $2)
            LIMIT 1
            "#,
        )
        .bind(identifier)
        .bind(admins_only)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn list_flagged_users(&self) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE is_flagged ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn set_flagged(&self, user_id: Uuid, flagged: bool) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET is_flagged = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(flagged)
        .bind(Utc::now())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_kyc_status(
        &self,
        user_id: Uuid,
        status: KycStatus,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET kyc_status = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
                .bind(password_hash)
                .bind(Utc::now())
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn used_credit(&self, user_id: Uuid) -> StoreResult<Decimal> {
        let used: Decimal = sqlx::query_scalar(USED_CREDIT_SQL)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(used)
    }

    async fn create_loan_within_ceiling(
        &self,
        loan: NewLoan,
        ceiling: Decimal,
    ) -> StoreResult<Admission> {
        let mut tx = self.pool.begin().await?;

        // Concurrent applications by the same user queue on this row lock
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(loan.user_id)
            .fetch_one(&mut *tx)
            .await?;

        let used: Decimal = sqlx::query_scalar(USED_CREDIT_SQL)
            .bind(loan.user_id)
            .fetch_one(&mut *tx)
            .await?;

        if !within_ceiling(used, loan.amount, ceiling) {
            tx.rollback().await?;
            return Ok(Admission::Exceeded { used });
        }

        let loan = loan.into_loan(Utc::now());
        let created = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (
                id, user_id, amount, purpose, category, duration_in_months, status,
                interest_rate, remaining_balance, vendor, loan_type, repayment_type,
                approval_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(loan.id)
        .bind(loan.user_id)
        .bind(loan.amount)
        .bind(&loan.purpose)
        .bind(loan.category)
        .bind(loan.duration_in_months)
        .bind(loan.status)
        .bind(loan.interest_rate)
        .bind(loan.remaining_balance)
        .bind(&loan.vendor)
        .bind(&loan.loan_type)
        .bind(&loan.repayment_type)
        .bind(loan.approval_date)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Admission::Opened(created))
    }

    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    async fn list_loans(&self, filter: &LoanFilter) -> StoreResult<Vec<Loan>> {
        let statuses: Option<Vec<String>> = filter
            .statuses
            .as_ref()
            .map(|s| s.iter().map(|status| status.as_str().to_string()).collect());

        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR category::text = $2)
              AND ($3::text[] IS NULL OR status::text = ANY($3))
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.category.map(|c| c.as_str()))
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn count_loans_by_category(&self) -> StoreResult<Vec<(LoanCategory, i64)>> {
        let rows = sqlx::query_as::<_, (LoanCategory, i64)>(
            "SELECT category, COUNT(*) FROM loans GROUP BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(LoanCategory::ALL
            .into_iter()
            .map(|c| {
                let count = rows
                    .iter()
                    .find(|(category, _)| *category == c)
                    .map_or(0, |(_, n)| *n);
                (c, count)
            })
            .collect())
    }

    async fn decide_loan(
        &self,
        loan_id: Uuid,
        update: LoanDecisionUpdate,
    ) -> StoreResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = $1, interest_rate = $2, approval_date = $3,
                loan_type = $4, repayment_type = $5, updated_at = $6
            WHERE id = $7 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(update.status)
        .bind(update.interest_rate)
        .bind(update.approval_date)
        .bind(&update.loan_type)
        .bind(&update.repayment_type)
        .bind(Utc::now())
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(loan)
    }

    async fn record_repayment(
        &self,
        loan_id: Uuid,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> StoreResult<RepaymentOutcome> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET remaining_balance = remaining_balance - $1,
                status = CASE
                    WHEN remaining_balance - $1 = 0 THEN 'paid off'::loan_status
                    ELSE status
                END,
                updated_at = $2
            WHERE id = $3
              AND status = 'approved'
              AND $1 > 0
              AND remaining_balance >= $1
            RETURNING *
            "#,
        )
        .bind(amount)
        .bind(at)
        .bind(loan_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(loan) = updated else {
            tx.rollback().await?;
            return Ok(match self.get_loan(loan_id).await? {
                Some(current) => RepaymentOutcome::Rejected(current),
                None => RepaymentOutcome::Missing,
            });
        };

        let repayment = sqlx::query_as::<_, LoanRepayment>(
            r#"
            INSERT INTO loan_repayments (id, loan_id, amount, repayment_date)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(loan_id)
        .bind(amount)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RepaymentOutcome::Applied { loan, repayment })
    }

    async fn repayments_for_loan(&self, loan_id: Uuid) -> StoreResult<Vec<LoanRepayment>> {
        let rows = sqlx::query_as::<_, LoanRepayment>(
            "SELECT * FROM loan_repayments WHERE loan_id = $1 ORDER BY repayment_date DESC",
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_repayments(&self, user_id: Option<Uuid>) -> StoreResult<Vec<RepaymentRecord>> {
        let rows = sqlx::query_as::<_, RepaymentRecord>(
            r#"
            SELECT r.id, r.loan_id, r.amount, r.repayment_date,
                   l.user_id, l.status AS loan_status
            FROM loan_repayments r
            JOIN loans l ON l.id = r.loan_id
            WHERE ($1::uuid IS NULL OR l.user_id = $1)
            ORDER BY r.repayment_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn portfolio_totals(&self) -> StoreResult<PortfolioTotals> {
        let (total_users, flagged_users): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_flagged) FROM users",
        )
        .fetch_one(&self.pool)
        .await?;

        let active_principal: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM loans WHERE status = $1",
        )
        .bind(LoanStatus::Approved)
        .fetch_one(&self.pool)
        .await?;

        let total_repaid: Decimal =
            sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM loan_repayments")
                .fetch_one(&self.pool)
                .await?;

        Ok(PortfolioTotals {
            total_users,
            flagged_users,
            active_principal,
            total_repaid,
        })
    }

    async fn insert_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (token_hash, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let row: Option<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            "DELETE FROM password_reset_tokens WHERE token_hash = $1 RETURNING user_id, expires_at",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(user_id, _)| user_id))
    }

    async fn purge_expired_reset_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
