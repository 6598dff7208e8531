use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Loan, LoanStatus, Member, MemberStatus, SavingsAccount, Transaction, TransactionStatus,
    TransactionType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Loans filtered by equality and ordered by creation time.
#[derive(Debug, Clone, Default)]
pub struct LoanQuery {
    pub member_id: Option<Uuid>,
    pub status: Option<LoanStatus>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl LoanQuery {
    pub fn with_status(status: LoanStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Transactions filtered by equality and an inclusive date range, ordered by date.
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub member_id: Option<Uuid>,
    pub kind: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn member(&self, id: Uuid) -> Result<Option<Member>>;
    async fn insert_member(&self, member: Member) -> Result<Member>;
    /// Replaces the stored record only while its status is still `expected`. Returns `None`
    /// when the id is unknown or the status has moved on.
    async fn update_member_if(
        &self,
        member: Member,
        expected: MemberStatus,
    ) -> Result<Option<Member>>;
    /// Fails with `ValidationError` while loans still reference the member.
    async fn delete_member(&self, id: Uuid) -> Result<bool>;
    /// Newest first.
    async fn list_members(&self, status: Option<MemberStatus>) -> Result<Vec<Member>>;
}

#[async_trait]
pub trait LoanStore: Send + Sync {
    async fn loan(&self, id: Uuid) -> Result<Option<Loan>>;
    async fn insert_loan(&self, loan: Loan) -> Result<Loan>;
    /// Replaces the stored record only while its status is still `expected`.
    async fn update_loan_if(&self, loan: Loan, expected: LoanStatus) -> Result<Option<Loan>>;
    async fn delete_loan(&self, id: Uuid) -> Result<bool>;
    async fn list_loans(&self, query: &LoanQuery) -> Result<Vec<Loan>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn transaction(&self, id: Uuid) -> Result<Option<Transaction>>;
    async fn insert_transaction(&self, transaction: Transaction) -> Result<Transaction>;
    /// The only mutation a ledger entry admits, applied while the status is still `expected`.
    async fn set_transaction_status_if(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>>;
    /// Ties on `date` are broken by `id` in the same direction.
    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait SavingsStore: Send + Sync {
    async fn savings_accounts(&self, member_id: Option<Uuid>) -> Result<Vec<SavingsAccount>>;
    async fn upsert_savings(&self, account: SavingsAccount) -> Result<SavingsAccount>;
}

#[async_trait]
pub trait MemberCodeSequence: Send + Sync {
    /// Next value of the per-year member code counter, starting at 1.
    async fn next_member_sequence(&self, year: i32) -> Result<u32>;
}

pub trait Store:
    MemberStore + LoanStore + TransactionStore + SavingsStore + MemberCodeSequence
{
}

impl<T> Store for T where
    T: MemberStore + LoanStore + TransactionStore + SavingsStore + MemberCodeSequence
{
}
