use async_trait::async_trait;
use ksp_core::{
    Error, Loan, LoanQuery, LoanStatus, LoanStore, Member, MemberCodeSequence, MemberStatus,
    MemberStore, Result, SavingsAccount, SavingsStore, SortOrder, Transaction, TransactionQuery,
    TransactionStatus, TransactionStore,
};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::rows::{
    LOAN_COLUMNS, MEMBER_COLUMNS, SAVINGS_COLUMNS, TRANSACTION_COLUMNS, loan_from_row,
    member_from_row, savings_from_row, term_to_db, transaction_from_row,
};

fn store_error(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            Error::ValidationError(db.message().to_string())
        }
        _ => Error::StoreUnavailable(err.to_string()),
    }
}

fn direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Ascending => " ASC",
        SortOrder::Descending => " DESC",
    }
}

fn push_limit(builder: &mut QueryBuilder<'_, Postgres>, limit: Option<usize>) {
    if let Some(limit) = limit {
        builder
            .push(" LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
}

/// Postgres-backed store. Each call is a single statement, so every write is atomic.
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
impl MemberStore for PgStore {
    async fn member(&self, id: Uuid) -> Result<Option<Member>> {
        let row = sqlx::query(&format!("SELECT {MEMBER_COLUMNS} FROM profiles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn insert_member(&self, member: Member) -> Result<Member> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, member_code, full_name, phone, address, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(member.id)
        .bind(&member.member_code)
        .bind(&member.full_name)
        .bind(&member.phone)
        .bind(&member.address)
        .bind(member.status.to_string())
        .bind(member.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(member)
    }

    async fn update_member_if(
        &self,
        member: Member,
        expected: MemberStatus,
    ) -> Result<Option<Member>> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET member_code = $2, full_name = $3, phone = $4, address = $5, status = $6
            WHERE id = $1 AND status = $7
            "#,
        )
        .bind(member.id)
        .bind(&member.member_code)
        .bind(&member.full_name)
        .bind(&member.phone)
        .bind(&member.address)
        .bind(member.status.to_string())
        .bind(expected.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok((result.rows_affected() > 0).then_some(member))
    }

    async fn delete_member(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_members(&self, status: Option<MemberStatus>) -> Result<Vec<Member>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {MEMBER_COLUMNS} FROM profiles"));
        if let Some(status) = status {
            builder.push(" WHERE status = ").push_bind(status.to_string());
        }
        builder.push(" ORDER BY created_at DESC, id DESC");
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.iter().map(member_from_row).collect()
    }
}

#[async_trait]
impl LoanStore for PgStore {
    async fn loan(&self, id: Uuid) -> Result<Option<Loan>> {
        let row = sqlx::query(&format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.as_ref().map(loan_from_row).transpose()
    }

    async fn insert_loan(&self, loan: Loan) -> Result<Loan> {
        sqlx::query(
            r#"
            INSERT INTO loans (
                id, member_id, amount, term_months, monthly_rate, start_date, status,
                monthly_payment, total_payment, remaining_amount, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(loan.id)
        .bind(loan.member_id)
        .bind(loan.amount)
        .bind(term_to_db(loan.term_months)?)
        .bind(loan.monthly_rate)
        .bind(loan.start_date)
        .bind(loan.status.to_string())
        .bind(loan.monthly_payment)
        .bind(loan.total_payment)
        .bind(loan.remaining_amount)
        .bind(loan.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(loan)
    }

    async fn update_loan_if(&self, loan: Loan, expected: LoanStatus) -> Result<Option<Loan>> {
        let result = sqlx::query(
            r#"
            UPDATE loans
            SET amount = $2, term_months = $3, monthly_rate = $4, start_date = $5, status = $6,
                monthly_payment = $7, total_payment = $8, remaining_amount = $9
            WHERE id = $1 AND status = $10
            "#,
        )
        .bind(loan.id)
        .bind(loan.amount)
        .bind(term_to_db(loan.term_months)?)
        .bind(loan.monthly_rate)
        .bind(loan.start_date)
        .bind(loan.status.to_string())
        .bind(loan.monthly_payment)
        .bind(loan.total_payment)
        .bind(loan.remaining_amount)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok((result.rows_affected() > 0).then_some(loan))
    }

    async fn delete_loan(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM loans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_loans(&self, query: &LoanQuery) -> Result<Vec<Loan>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {LOAN_COLUMNS} FROM loans WHERE TRUE"));
        if let Some(member_id) = query.member_id {
            builder.push(" AND member_id = ").push_bind(member_id);
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.to_string());
        }
        let direction = direction(query.order);
        builder.push(format!(" ORDER BY created_at{direction}, id{direction}"));
        push_limit(&mut builder, query.limit);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.iter().map(loan_from_row).collect()
    }
}

#[async_trait]
impl TransactionStore for PgStore {
    async fn transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn insert_transaction(&self, transaction: Transaction) -> Result<Transaction> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, member_id, date, description, type, amount, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.member_id)
        .bind(transaction.date)
        .bind(&transaction.description)
        .bind(transaction.kind.to_string())
        .bind(transaction.amount)
        .bind(transaction.status.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(transaction)
    }

    async fn set_transaction_status_if(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "UPDATE transactions SET status = $2 WHERE id = $1 AND status = $3 \
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(id)
        .bind(status.to_string())
        .bind(expected.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE TRUE"
        ));
        if let Some(member_id) = query.member_id {
            builder.push(" AND member_id = ").push_bind(member_id);
        }
        if let Some(kind) = query.kind {
            builder.push(" AND type = ").push_bind(kind.to_string());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(from) = query.from {
            builder.push(" AND date >= ").push_bind(from);
        }
        if let Some(to) = query.to {
            builder.push(" AND date <= ").push_bind(to);
        }
        let direction = direction(query.order);
        builder.push(format!(" ORDER BY date{direction}, id{direction}"));
        push_limit(&mut builder, query.limit);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl SavingsStore for PgStore {
    async fn savings_accounts(&self, member_id: Option<Uuid>) -> Result<Vec<SavingsAccount>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {SAVINGS_COLUMNS} FROM savings"));
        if let Some(member_id) = member_id {
            builder.push(" WHERE member_id = ").push_bind(member_id);
        }
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.iter().map(savings_from_row).collect()
    }

    async fn upsert_savings(&self, account: SavingsAccount) -> Result<SavingsAccount> {
        sqlx::query(
            r#"
            INSERT INTO savings (member_id, kind, balance)
            VALUES ($1, $2, $3)
            ON CONFLICT (member_id, kind) DO UPDATE SET balance = EXCLUDED.balance
            "#,
        )
        .bind(account.member_id)
        .bind(account.kind.to_string())
        .bind(account.balance)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(account)
    }
}

#[async_trait]
impl MemberCodeSequence for PgStore {
    async fn next_member_sequence(&self, year: i32) -> Result<u32> {
        let row = sqlx::query(
            r#"
            INSERT INTO member_code_counters (year, last_value)
            VALUES ($1, 1)
            ON CONFLICT (year) DO UPDATE SET last_value = member_code_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(year)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;
        let value: i32 = row.try_get("last_value").map_err(store_error)?;
        u32::try_from(value)
            .map_err(|_| Error::StoreUnavailable(format!("member code counter at {value}")))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use ksp_core::{SavingsType, TransactionType};
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::ensure_schema;

    async fn store(pool: PgPool) -> PgStore {
        ensure_schema(&pool).await.unwrap();
        PgStore::new(pool)
    }

    async fn member(store: &PgStore, name: &str, status: MemberStatus, days_ago: i64) -> Member {
        store
            .insert_member(Member {
                id: Uuid::new_v4(),
                member_code: (status != MemberStatus::Pending).then(|| format!("KSP-2024-{name}")),
                full_name: name.to_string(),
                phone: "0812".to_string(),
                address: "Bandung".to_string(),
                status,
                created_at: Utc::now() - Duration::days(days_ago),
            })
            .await
            .unwrap()
    }

    fn loan(member_id: Uuid, status: LoanStatus, minutes_ago: i64) -> Loan {
        Loan {
            id: Uuid::new_v4(),
            member_id,
            amount: Decimal::new(5_000_000, 0),
            term_months: 12,
            monthly_rate: Decimal::new(15, 3),
            start_date: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            status,
            monthly_payment: Decimal::new(5_900_000, 0) / Decimal::from(12u32),
            total_payment: Decimal::new(5_900_000, 0),
            remaining_amount: Decimal::new(5_900_000, 0),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    fn trx(member_id: Uuid, day: u32, kind: TransactionType, amount: i64) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            member_id,
            date: NaiveDate::from_ymd_opt(2024, 10, day).unwrap(),
            description: format!("{kind} {day}"),
            kind,
            amount: Decimal::new(amount, 0),
            status: TransactionStatus::Pending,
        }
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn member_rows_round_trip_and_filter(pool: PgPool) {
        let store = store(pool).await;
        let older = member(&store, "Budi", MemberStatus::Active, 3).await;
        let newer = member(&store, "Ani", MemberStatus::Pending, 1).await;

        assert_eq!(store.member(older.id).await.unwrap().unwrap().full_name, "Budi");
        let all = store.list_members(None).await.unwrap();
        assert_eq!(all.iter().map(|m| m.id).collect::<Vec<_>>(), vec![newer.id, older.id]);
        let pending = store.list_members(Some(MemberStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].member_code, None);
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn loans_filter_order_and_limit(pool: PgPool) {
        let store = store(pool).await;
        let budi = member(&store, "Budi", MemberStatus::Active, 3).await;
        let oldest = store.insert_loan(loan(budi.id, LoanStatus::Pending, 30)).await.unwrap();
        let newest = store.insert_loan(loan(budi.id, LoanStatus::Pending, 1)).await.unwrap();
        store.insert_loan(loan(budi.id, LoanStatus::Approved, 0)).await.unwrap();

        let limited = LoanQuery {
            limit: Some(1),
            ..LoanQuery::with_status(LoanStatus::Pending)
        };
        assert_eq!(store.list_loans(&limited).await.unwrap()[0].id, newest.id);

        let ascending = LoanQuery {
            order: SortOrder::Ascending,
            ..LoanQuery::with_status(LoanStatus::Pending)
        };
        let ids: Vec<Uuid> = store
            .list_loans(&ascending)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![oldest.id, newest.id]);

        let stored = store.loan(oldest.id).await.unwrap().unwrap();
        assert_eq!(stored.monthly_payment, oldest.monthly_payment);
        assert_eq!(stored.term_months, 12);
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn guarded_loan_update_checks_status(pool: PgPool) {
        let store = store(pool).await;
        let budi = member(&store, "Budi", MemberStatus::Active, 3).await;
        let pending = store.insert_loan(loan(budi.id, LoanStatus::Pending, 0)).await.unwrap();

        let approved = Loan {
            status: LoanStatus::Approved,
            ..pending.clone()
        };
        assert!(store
            .update_loan_if(approved, LoanStatus::Pending)
            .await
            .unwrap()
            .is_some());
        let rejected = Loan {
            status: LoanStatus::Rejected,
            ..pending.clone()
        };
        assert!(store
            .update_loan_if(rejected, LoanStatus::Pending)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.loan(pending.id).await.unwrap().unwrap().status,
            LoanStatus::Approved
        );
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn member_with_loans_is_a_validation_error(pool: PgPool) {
        let store = store(pool).await;
        let budi = member(&store, "Budi", MemberStatus::Active, 3).await;
        let loan = store.insert_loan(loan(budi.id, LoanStatus::Paid, 0)).await.unwrap();

        let err = store.delete_member(budi.id).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)), "{err}");

        assert!(store.delete_loan(loan.id).await.unwrap());
        assert!(store.delete_member(budi.id).await.unwrap());
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn transaction_dates_are_inclusive_and_settle_once(pool: PgPool) {
        let store = store(pool).await;
        let member = Uuid::new_v4();
        for day in [1, 10, 20, 31] {
            store
                .insert_transaction(trx(member, day, TransactionType::Simpanan, 50_000))
                .await
                .unwrap();
        }
        let withdrawal = store
            .insert_transaction(trx(member, 15, TransactionType::Penarikan, -250_000))
            .await
            .unwrap();

        let query = TransactionQuery {
            member_id: Some(member),
            kind: Some(TransactionType::Simpanan),
            from: NaiveDate::from_ymd_opt(2024, 10, 10),
            to: NaiveDate::from_ymd_opt(2024, 10, 20),
            ..TransactionQuery::default()
        };
        let days: Vec<u32> = store
            .list_transactions(&query)
            .await
            .unwrap()
            .iter()
            .map(|t| chrono::Datelike::day(&t.date))
            .collect();
        assert_eq!(days, vec![20, 10]);

        let settled = store
            .set_transaction_status_if(
                withdrawal.id,
                TransactionStatus::Pending,
                TransactionStatus::Berhasil,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled.amount, Decimal::new(-250_000, 0));
        assert!(store
            .set_transaction_status_if(
                withdrawal.id,
                TransactionStatus::Pending,
                TransactionStatus::Gagal,
            )
            .await
            .unwrap()
            .is_none());
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn savings_upsert_and_code_sequence(pool: PgPool) {
        let store = store(pool).await;
        let member = Uuid::new_v4();
        for balance in [100, 250] {
            store
                .upsert_savings(SavingsAccount {
                    member_id: member,
                    kind: SavingsType::Wajib,
                    balance: Decimal::new(balance, 0),
                })
                .await
                .unwrap();
        }
        let accounts = store.savings_accounts(Some(member)).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].balance, Decimal::new(250, 0));

        assert_eq!(store.next_member_sequence(2024).await.unwrap(), 1);
        assert_eq!(store.next_member_sequence(2024).await.unwrap(), 2);
        assert_eq!(store.next_member_sequence(2025).await.unwrap(), 1);
    }
}
