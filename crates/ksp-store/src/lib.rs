use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use ksp_core::{
    Error, Loan, LoanQuery, LoanStatus, LoanStore, Member, MemberCodeSequence, MemberStatus,
    MemberStore, Result, SavingsAccount, SavingsStore, SortOrder, Transaction, TransactionQuery,
    TransactionStatus, TransactionStore,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Store kept entirely in process memory. Used by tests and local runs.
#[derive(Default)]
pub struct InMemoryStore {
    members: RwLock<HashMap<Uuid, Member>>,
    loans: RwLock<HashMap<Uuid, Loan>>,
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    savings: RwLock<Vec<SavingsAccount>>,
    member_sequences: RwLock<HashMap<i32, u32>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with `StoreUnavailable` and nothing is written.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::StoreUnavailable("in-memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

fn apply_order<T, K: Ord>(items: &mut Vec<T>, order: SortOrder, key: impl Fn(&T) -> K) {
    items.sort_by(|a, b| match order {
        SortOrder::Ascending => key(a).cmp(&key(b)),
        SortOrder::Descending => key(b).cmp(&key(a)),
    });
}

#[async_trait]
impl MemberStore for InMemoryStore {
    async fn member(&self, id: Uuid) -> Result<Option<Member>> {
        self.check()?;
        Ok(self.members.read().await.get(&id).cloned())
    }

    async fn insert_member(&self, member: Member) -> Result<Member> {
        self.check()?;
        let mut members = self.members.write().await;
        if members.contains_key(&member.id) {
            return Err(Error::ValidationError(format!(
                "member {} already exists",
                member.id
            )));
        }
        members.insert(member.id, member.clone());
        Ok(member)
    }

    async fn update_member_if(
        &self,
        member: Member,
        expected: MemberStatus,
    ) -> Result<Option<Member>> {
        self.check()?;
        let mut members = self.members.write().await;
        match members.get_mut(&member.id) {
            Some(slot) if slot.status == expected => {
                *slot = member.clone();
                Ok(Some(member))
            }
            _ => Ok(None),
        }
    }

    async fn delete_member(&self, id: Uuid) -> Result<bool> {
        self.check()?;
        let mut members = self.members.write().await;
        let loans = self.loans.read().await.values().filter(|l| l.member_id == id).count();
        if loans > 0 {
            return Err(Error::ValidationError(format!(
                "member {id} still has {loans} loan(s) on record"
            )));
        }
        Ok(members.remove(&id).is_some())
    }

    async fn list_members(&self, status: Option<MemberStatus>) -> Result<Vec<Member>> {
        self.check()?;
        let members = self.members.read().await;
        let mut items: Vec<Member> = members
            .values()
            .filter(|m| status.is_none_or(|s| m.status == s))
            .cloned()
            .collect();
        apply_order(&mut items, SortOrder::Descending, |m| (m.created_at, m.id));
        Ok(items)
    }
}

#[async_trait]
impl LoanStore for InMemoryStore {
    async fn loan(&self, id: Uuid) -> Result<Option<Loan>> {
        self.check()?;
        Ok(self.loans.read().await.get(&id).cloned())
    }

    async fn insert_loan(&self, loan: Loan) -> Result<Loan> {
        self.check()?;
        let members = self.members.read().await;
        if !members.contains_key(&loan.member_id) {
            return Err(Error::ValidationError(format!(
                "loan {} references unknown member {}",
                loan.id, loan.member_id
            )));
        }
        let mut loans = self.loans.write().await;
        if loans.contains_key(&loan.id) {
            return Err(Error::ValidationError(format!(
                "loan {} already exists",
                loan.id
            )));
        }
        loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn update_loan_if(&self, loan: Loan, expected: LoanStatus) -> Result<Option<Loan>> {
        self.check()?;
        let mut loans = self.loans.write().await;
        match loans.get_mut(&loan.id) {
            Some(slot) if slot.status == expected => {
                *slot = loan.clone();
                Ok(Some(loan))
            }
            _ => Ok(None),
        }
    }

    async fn delete_loan(&self, id: Uuid) -> Result<bool> {
        self.check()?;
        Ok(self.loans.write().await.remove(&id).is_some())
    }

    async fn list_loans(&self, query: &LoanQuery) -> Result<Vec<Loan>> {
        self.check()?;
        let loans = self.loans.read().await;
        let mut items: Vec<Loan> = loans
            .values()
            .filter(|l| query.member_id.is_none_or(|id| l.member_id == id))
            .filter(|l| query.status.is_none_or(|s| l.status == s))
            .cloned()
            .collect();
        apply_order(&mut items, query.order, |l| (l.created_at, l.id));
        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        Ok(items)
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.check()?;
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn insert_transaction(&self, transaction: Transaction) -> Result<Transaction> {
        self.check()?;
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&transaction.id) {
            return Err(Error::ValidationError(format!(
                "transaction {} already exists",
                transaction.id
            )));
        }
        transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn set_transaction_status_if(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>> {
        self.check()?;
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&id) {
            Some(entry) if entry.status == expected => {
                entry.status = status;
                Ok(Some(entry.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>> {
        self.check()?;
        let transactions = self.transactions.read().await;
        let mut items: Vec<Transaction> = transactions
            .values()
            .filter(|t| query.member_id.is_none_or(|id| t.member_id == id))
            .filter(|t| query.kind.is_none_or(|k| t.kind == k))
            .filter(|t| query.status.is_none_or(|s| t.status == s))
            .filter(|t| query.from.is_none_or(|from| t.date >= from))
            .filter(|t| query.to.is_none_or(|to| t.date <= to))
            .cloned()
            .collect();
        apply_order(&mut items, query.order, |t| (t.date, t.id));
        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        Ok(items)
    }
}

#[async_trait]
impl SavingsStore for InMemoryStore {
    async fn savings_accounts(&self, member_id: Option<Uuid>) -> Result<Vec<SavingsAccount>> {
        self.check()?;
        let savings = self.savings.read().await;
        Ok(savings
            .iter()
            .filter(|a| member_id.is_none_or(|id| a.member_id == id))
            .cloned()
            .collect())
    }

    async fn upsert_savings(&self, account: SavingsAccount) -> Result<SavingsAccount> {
        self.check()?;
        let mut savings = self.savings.write().await;
        match savings
            .iter_mut()
            .find(|a| a.member_id == account.member_id && a.kind == account.kind)
        {
            Some(existing) => existing.balance = account.balance,
            None => savings.push(account.clone()),
        }
        Ok(account)
    }
}

#[async_trait]
impl MemberCodeSequence for InMemoryStore {
    async fn next_member_sequence(&self, year: i32) -> Result<u32> {
        self.check()?;
        let mut sequences = self.member_sequences.write().await;
        let counter = sequences.entry(year).or_default();
        *counter += 1;
        Ok(*counter)
    }
}
