use chrono::NaiveDate;
use ksp_core::{
    Error, MemberStore, Result, SavingsAccount, SavingsStore, SavingsType, Session, Transaction,
    TransactionStatus, TransactionStore, TransactionType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// A ledger entry as keyed in by an admin. Debit types carry a negative amount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
    pub member_id: Uuid,
    pub date: NaiveDate,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
}

impl TransactionEntry {
    fn validated(self) -> Result<Self> {
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err(Error::InvalidInput("description must not be empty".to_string()));
        }
        if self.amount.is_zero() {
            return Err(Error::InvalidInput("amount must not be zero".to_string()));
        }
        if self.kind.is_debit() != self.amount.is_sign_negative() {
            let expected = if self.kind.is_debit() { "negative" } else { "positive" };
            return Err(Error::InvalidInput(format!(
                "{} entries must have a {expected} amount, got {}",
                self.kind, self.amount
            )));
        }
        Ok(Self {
            description,
            ..self
        })
    }
}

/// Admin postings: new ledger entries, their settlement, and savings balances.
pub struct LedgerBook<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> LedgerBook<'a, S>
where
    S: MemberStore + TransactionStore + SavingsStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Records a pending entry for an existing member.
    pub async fn record(&self, session: &Session, entry: TransactionEntry) -> Result<Transaction> {
        session.require_admin("recording a transaction")?;
        let entry = entry.validated()?;
        self.require_member(entry.member_id).await?;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            member_id: entry.member_id,
            date: entry.date,
            description: entry.description,
            kind: entry.kind,
            amount: entry.amount,
            status: TransactionStatus::Pending,
        };
        let transaction = self.store.insert_transaction(transaction).await?;
        info!(
            "{} of {} recorded for member {}",
            transaction.kind, transaction.amount, transaction.member_id
        );
        Ok(transaction)
    }

    /// Moves a pending entry to `berhasil` or `gagal`. Settled entries never change again.
    pub async fn settle(
        &self,
        session: &Session,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> Result<Transaction> {
        session.require_admin("settling a transaction")?;
        if status == TransactionStatus::Pending {
            return Err(Error::InvalidInput(
                "a transaction settles as berhasil or gagal".to_string(),
            ));
        }
        let settled = self
            .store
            .set_transaction_status_if(transaction_id, TransactionStatus::Pending, status)
            .await?;
        match settled {
            Some(transaction) => {
                info!("transaction {} settled as {}", transaction.id, transaction.status);
                Ok(transaction)
            }
            None => match self.store.transaction(transaction_id).await? {
                Some(current) => Err(Error::illegal_transition(
                    "transaction",
                    transaction_id,
                    current.status,
                    status,
                )),
                None => Err(Error::NotFound {
                    entity: "transaction",
                    id: transaction_id,
                }),
            },
        }
    }

    pub async fn set_savings(
        &self,
        session: &Session,
        member_id: Uuid,
        kind: SavingsType,
        balance: Decimal,
    ) -> Result<SavingsAccount> {
        session.require_admin("setting a savings balance")?;
        if balance.is_sign_negative() {
            return Err(Error::InvalidInput(format!(
                "savings balance must not be negative, got {balance}"
            )));
        }
        self.require_member(member_id).await?;
        let account = self
            .store
            .upsert_savings(SavingsAccount {
                member_id,
                kind,
                balance,
            })
            .await?;
        info!("{} savings of member {} set to {}", kind, member_id, balance);
        Ok(account)
    }

    async fn require_member(&self, member_id: Uuid) -> Result<()> {
        match self.store.member(member_id).await? {
            Some(_) => Ok(()),
            None => Err(Error::ValidationError(format!(
                "member {member_id} does not exist"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ksp_core::{Member, MemberStatus, TransactionQuery};
    use ksp_store::InMemoryStore;

    use super::*;

    fn admin() -> Session {
        Session::admin(Uuid::new_v4(), "admin@ksp.com")
    }

    async fn seed_member(store: &InMemoryStore) -> Uuid {
        let member = Member {
            id: Uuid::new_v4(),
            member_code: Some("KSP-2024-0007".to_string()),
            full_name: "Rudi Hartono".to_string(),
            phone: String::new(),
            address: String::new(),
            status: MemberStatus::Active,
            created_at: Utc::now(),
        };
        store.insert_member(member).await.unwrap().id
    }

    fn entry(member_id: Uuid, kind: TransactionType, amount: i64) -> TransactionEntry {
        TransactionEntry {
            member_id,
            date: NaiveDate::from_ymd_opt(2024, 10, 25).unwrap(),
            description: " Setoran Simpanan Wajib ".to_string(),
            kind,
            amount: Decimal::new(amount, 0),
        }
    }

    #[tokio::test]
    async fn recorded_entries_start_pending() {
        let store = InMemoryStore::new();
        let member = seed_member(&store).await;
        let book = LedgerBook::new(&store);

        let trx = book
            .record(&admin(), entry(member, TransactionType::Simpanan, 50_000))
            .await
            .unwrap();
        assert_eq!(trx.status, TransactionStatus::Pending);
        assert_eq!(trx.description, "Setoran Simpanan Wajib");
        assert_eq!(store.transaction(trx.id).await.unwrap(), Some(trx));
    }

    #[tokio::test]
    async fn amount_sign_follows_transaction_type() {
        let store = InMemoryStore::new();
        let member = seed_member(&store).await;
        let book = LedgerBook::new(&store);
        let session = admin();

        for (kind, amount) in [
            (TransactionType::Penarikan, 250_000),
            (TransactionType::Pinjaman, 5_000_000),
            (TransactionType::Simpanan, -50_000),
            (TransactionType::Pembayaran, 0),
        ] {
            let err = book.record(&session, entry(member, kind, amount)).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{kind} {amount}");
        }
        book.record(&session, entry(member, TransactionType::Penarikan, -250_000))
            .await
            .unwrap();

        let unknown = book
            .record(&session, entry(Uuid::new_v4(), TransactionType::Simpanan, 1))
            .await
            .unwrap_err();
        assert!(matches!(unknown, Error::ValidationError(_)));
        let stored = store.list_transactions(&TransactionQuery::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn settled_entries_are_final() {
        let store = InMemoryStore::new();
        let member = seed_member(&store).await;
        let book = LedgerBook::new(&store);
        let session = admin();
        let trx = book
            .record(&session, entry(member, TransactionType::Simpanan, 50_000))
            .await
            .unwrap();

        let invalid = book.settle(&session, trx.id, TransactionStatus::Pending).await;
        assert!(matches!(invalid, Err(Error::InvalidInput(_))));

        let settled = book
            .settle(&session, trx.id, TransactionStatus::Berhasil)
            .await
            .unwrap();
        assert_eq!(settled.status, TransactionStatus::Berhasil);

        let again = book.settle(&session, trx.id, TransactionStatus::Gagal).await;
        assert!(matches!(again, Err(Error::IllegalTransition { .. })));
        let missing = book.settle(&session, Uuid::new_v4(), TransactionStatus::Gagal).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn savings_balances_are_admin_only_and_non_negative() {
        let store = InMemoryStore::new();
        let member = seed_member(&store).await;
        let book = LedgerBook::new(&store);

        let own = Session::member(member, "rudi@example.com");
        let forbidden = book
            .set_savings(&own, member, SavingsType::Sukarela, Decimal::new(10_000_000, 0))
            .await;
        assert!(matches!(forbidden, Err(Error::Forbidden(_))));

        let negative = book
            .set_savings(&admin(), member, SavingsType::Pokok, Decimal::new(-1, 0))
            .await;
        assert!(matches!(negative, Err(Error::InvalidInput(_))));

        let account = book
            .set_savings(&admin(), member, SavingsType::Pokok, Decimal::new(500_000, 0))
            .await
            .unwrap();
        assert_eq!(store.savings_accounts(Some(member)).await.unwrap(), vec![account]);
    }
}
