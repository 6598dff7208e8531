pub mod posting;

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use ksp_core::{
    Error, Loan, LoanQuery, LoanStatus, LoanStore, Member, MemberStatus, MemberStore, Result,
    SavingsAccount, SavingsStore, SavingsType, Store, Transaction, TransactionQuery,
    TransactionStore, TransactionType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use posting::{LedgerBook, TransactionEntry};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub active_members: usize,
    pub pending_members: usize,
    pub total_savings: Decimal,
    pub total_disbursed: Decimal,
    pub outstanding_receivable: Decimal,
    pub pending_loans: usize,
}

/// A loan joined with the name of its member for the admin loan register.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoanEntry {
    #[serde(flatten)]
    pub loan: Loan,
    pub member_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReport {
    pub year: i32,
    pub month: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub transactions: Vec<Transaction>,
    pub totals: BTreeMap<TransactionType, Decimal>,
    pub mutasi_simpanan: Decimal,
    pub mutasi_pinjaman: Decimal,
}

/// One member's savings split by type, as shown on the member dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemberSavings {
    pub member_id: Uuid,
    pub pokok: Decimal,
    pub wajib: Decimal,
    pub sukarela: Decimal,
    pub total: Decimal,
}

impl MemberSavings {
    pub fn from_accounts<'a>(
        member_id: Uuid,
        accounts: impl IntoIterator<Item = &'a SavingsAccount>,
    ) -> Self {
        let mut savings = MemberSavings {
            member_id,
            pokok: Decimal::ZERO,
            wajib: Decimal::ZERO,
            sukarela: Decimal::ZERO,
            total: Decimal::ZERO,
        };
        for account in accounts.into_iter().filter(|a| a.member_id == member_id) {
            let slot = match account.kind {
                SavingsType::Pokok => &mut savings.pokok,
                SavingsType::Wajib => &mut savings.wajib,
                SavingsType::Sukarela => &mut savings.sukarela,
            };
            *slot += account.balance;
            savings.total += account.balance;
        }
        savings
    }

    /// Reads only the accounts of `member_id`.
    pub async fn load<S: SavingsStore + ?Sized>(store: &S, member_id: Uuid) -> Result<Self> {
        let accounts = store.savings_accounts(Some(member_id)).await?;
        Ok(Self::from_accounts(member_id, &accounts))
    }
}

/// Sum of `amount` for one transaction type. Debit-typed entries count by absolute value.
pub fn type_total<'t>(
    transactions: impl IntoIterator<Item = &'t Transaction>,
    kind: TransactionType,
) -> Decimal {
    transactions
        .into_iter()
        .filter(|t| t.kind == kind)
        .map(|t| if kind.is_debit() { t.amount.abs() } else { t.amount })
        .sum()
}

/// Per-type totals over an already filtered set. Every type is present, zero when absent.
pub fn monthly_totals(transactions: &[Transaction]) -> BTreeMap<TransactionType, Decimal> {
    TransactionType::ALL
        .into_iter()
        .map(|kind| (kind, type_total(transactions, kind)))
        .collect()
}

/// Read-only figures recomputed from full collections on every query.
#[derive(Debug, Clone, Default)]
pub struct LedgerProjection {
    members: Vec<Member>,
    loans: Vec<Loan>,
    transactions: Vec<Transaction>,
    savings: Vec<SavingsAccount>,
}

impl LedgerProjection {
    pub fn new(
        members: Vec<Member>,
        loans: Vec<Loan>,
        transactions: Vec<Transaction>,
        savings: Vec<SavingsAccount>,
    ) -> Self {
        Self {
            members,
            loans,
            transactions,
            savings,
        }
    }

    pub async fn load<S: Store + ?Sized>(store: &S) -> Result<Self> {
        let members = store.list_members(None).await?;
        let loans = store.list_loans(&LoanQuery::default()).await?;
        let transactions = store.list_transactions(&TransactionQuery::default()).await?;
        let savings = store.savings_accounts(None).await?;
        Ok(Self::new(members, loans, transactions, savings))
    }

    pub fn active_member_count(&self) -> usize {
        self.count_members(MemberStatus::Active)
    }

    pub fn pending_member_count(&self) -> usize {
        self.count_members(MemberStatus::Pending)
    }

    fn count_members(&self, status: MemberStatus) -> usize {
        self.members.iter().filter(|m| m.status == status).count()
    }

    pub fn total_disbursed(&self) -> Decimal {
        self.approved_loans().map(|l| l.amount).sum()
    }

    /// Remaining amounts still owed on approved loans.
    pub fn outstanding_receivable(&self) -> Decimal {
        self.approved_loans().map(|l| l.remaining_amount).sum()
    }

    fn approved_loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.iter().filter(|l| l.status == LoanStatus::Approved)
    }

    pub fn total_savings(&self) -> Decimal {
        self.savings.iter().map(|a| a.balance).sum()
    }

    pub fn pending_loan_count(&self) -> usize {
        self.loans
            .iter()
            .filter(|l| l.status == LoanStatus::Pending)
            .count()
    }

    /// Pending loans, newest first.
    pub fn pending_loans(&self, limit: Option<usize>) -> Vec<Loan> {
        let mut pending: Vec<Loan> = self
            .loans
            .iter()
            .filter(|l| l.status == LoanStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        if let Some(limit) = limit {
            pending.truncate(limit);
        }
        pending
    }

    /// Transactions dated within `start..=end`, optionally for one member, newest first.
    pub fn transactions_in_period(
        &self,
        member_id: Option<Uuid>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        if start > end {
            return Err(Error::InvalidInput(format!(
                "period start {start} is after end {end}"
            )));
        }
        let mut items: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| member_id.is_none_or(|id| t.member_id == id))
            .filter(|t| t.date >= start && t.date <= end)
            .cloned()
            .collect();
        items.sort_by(|a, b| (b.date, b.id).cmp(&(a.date, a.id)));
        Ok(items)
    }

    /// Case-insensitive search on member name plus optional status filter, newest first.
    pub fn loan_register(&self, search: Option<&str>, status: Option<LoanStatus>) -> Vec<LoanEntry> {
        let names: HashMap<Uuid, &str> = self
            .members
            .iter()
            .map(|m| (m.id, m.full_name.as_str()))
            .collect();
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut entries: Vec<LoanEntry> = self
            .loans
            .iter()
            .filter(|l| status.is_none_or(|s| l.status == s))
            .filter(|l| match &needle {
                Some(needle) => names
                    .get(&l.member_id)
                    .is_some_and(|name| name.to_lowercase().contains(needle.as_str())),
                None => true,
            })
            .map(|l| LoanEntry {
                loan: l.clone(),
                member_name: names.get(&l.member_id).map(|name| name.to_string()),
            })
            .collect();
        entries.sort_by(|a, b| {
            (b.loan.created_at, b.loan.id).cmp(&(a.loan.created_at, a.loan.id))
        });
        entries
    }

    /// Admin member list, newest first. `search` matches the name or the member code,
    /// ignoring case.
    pub fn member_directory(
        &self,
        search: Option<&str>,
        status: Option<MemberStatus>,
    ) -> Vec<Member> {
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let mut members: Vec<Member> = self
            .members
            .iter()
            .filter(|m| status.is_none_or(|s| m.status == s))
            .filter(|m| match &needle {
                Some(needle) => {
                    m.full_name.to_lowercase().contains(needle.as_str())
                        || m
                            .member_code
                            .as_deref()
                            .is_some_and(|code| code.to_lowercase().contains(needle.as_str()))
                }
                None => true,
            })
            .cloned()
            .collect();
        members.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        members
    }

    pub fn summary(&self) -> DashboardSummary {
        DashboardSummary {
            active_members: self.active_member_count(),
            pending_members: self.pending_member_count(),
            total_savings: self.total_savings(),
            total_disbursed: self.total_disbursed(),
            outstanding_receivable: self.outstanding_receivable(),
            pending_loans: self.pending_loan_count(),
        }
    }

    /// Calendar-month report across all members.
    pub fn period_report(&self, year: i32, month: u32) -> Result<PeriodReport> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| Error::InvalidInput(format!("no such month {year}-{month}")))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let end = next
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| Error::InvalidInput(format!("no such month {year}-{month}")))?;

        let transactions = self.transactions_in_period(None, start, end)?;
        let totals = monthly_totals(&transactions);
        Ok(PeriodReport {
            year: start.year(),
            month: start.month(),
            start,
            end,
            mutasi_simpanan: totals[&TransactionType::Simpanan],
            mutasi_pinjaman: totals[&TransactionType::Pinjaman],
            totals,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use ksp_core::TransactionStatus;
    use ksp_store::InMemoryStore;

    use super::*;

    fn rupiah(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn member(name: &str, status: MemberStatus) -> Member {
        Member {
            id: Uuid::new_v4(),
            member_code: None,
            full_name: name.to_string(),
            phone: String::new(),
            address: String::new(),
            status,
            created_at: Utc::now(),
        }
    }

    fn loan(member_id: Uuid, amount: i64, status: LoanStatus, minutes_ago: i64) -> Loan {
        Loan {
            id: Uuid::new_v4(),
            member_id,
            amount: rupiah(amount),
            term_months: 12,
            monthly_rate: Decimal::new(15, 3),
            start_date: date(2024, 1, 1),
            status,
            monthly_payment: Decimal::ZERO,
            total_payment: rupiah(amount),
            remaining_amount: rupiah(amount),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    fn trx(member_id: Uuid, on: NaiveDate, kind: TransactionType, amount: i64) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            member_id,
            date: on,
            description: kind.to_string(),
            kind,
            amount: rupiah(amount),
            status: TransactionStatus::Berhasil,
        }
    }

    #[test]
    fn counts_pending_loans() {
        let m = Uuid::new_v4();
        let loans = vec![
            loan(m, 1, LoanStatus::Pending, 1),
            loan(m, 1, LoanStatus::Pending, 2),
            loan(m, 1, LoanStatus::Pending, 3),
            loan(m, 1, LoanStatus::Approved, 4),
            loan(m, 1, LoanStatus::Approved, 5),
            loan(m, 1, LoanStatus::Rejected, 6),
        ];
        let projection = LedgerProjection::new(vec![], loans, vec![], vec![]);
        assert_eq!(projection.pending_loan_count(), 3);
    }

    #[test]
    fn disbursed_counts_only_approved() {
        let m = Uuid::new_v4();
        let projection = LedgerProjection::new(
            vec![],
            vec![
                loan(m, 5_000_000, LoanStatus::Approved, 1),
                loan(m, 2_000_000, LoanStatus::Pending, 2),
            ],
            vec![],
            vec![],
        );
        assert_eq!(projection.total_disbursed(), rupiah(5_000_000));
        assert_eq!(projection.outstanding_receivable(), rupiah(5_000_000));
    }

    #[test]
    fn pending_loans_newest_first() {
        let m = Uuid::new_v4();
        let old = loan(m, 1, LoanStatus::Pending, 60);
        let new = loan(m, 2, LoanStatus::Pending, 1);
        let mid = loan(m, 3, LoanStatus::Pending, 30);
        let projection = LedgerProjection::new(
            vec![],
            vec![old.clone(), new.clone(), mid.clone(), loan(m, 4, LoanStatus::Paid, 0)],
            vec![],
            vec![],
        );
        let ids: Vec<Uuid> = projection.pending_loans(Some(2)).iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![new.id, mid.id]);
        assert_eq!(projection.pending_loans(None).len(), 3);
    }

    #[test]
    fn member_counts_and_savings() {
        let a = member("A", MemberStatus::Active);
        let savings = vec![
            SavingsAccount { member_id: a.id, kind: SavingsType::Pokok, balance: rupiah(100_000) },
            SavingsAccount { member_id: a.id, kind: SavingsType::Wajib, balance: rupiah(50_000) },
        ];
        let projection = LedgerProjection::new(
            vec![
                a,
                member("B", MemberStatus::Active),
                member("C", MemberStatus::Pending),
                member("D", MemberStatus::Inactive),
            ],
            vec![],
            vec![],
            savings,
        );
        assert_eq!(projection.active_member_count(), 2);
        assert_eq!(projection.pending_member_count(), 1);
        assert_eq!(projection.total_savings(), rupiah(150_000));
    }

    #[test]
    fn period_is_inclusive_and_member_scoped() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let projection = LedgerProjection::new(
            vec![],
            vec![],
            vec![
                trx(me, date(2024, 10, 1), TransactionType::Simpanan, 50_000),
                trx(me, date(2024, 10, 31), TransactionType::Penarikan, -200_000),
                trx(me, date(2024, 11, 1), TransactionType::Simpanan, 50_000),
                trx(other, date(2024, 10, 15), TransactionType::Simpanan, 75_000),
            ],
            vec![],
        );

        let mine = projection
            .transactions_in_period(Some(me), date(2024, 10, 1), date(2024, 10, 31))
            .unwrap();
        let days: Vec<NaiveDate> = mine.iter().map(|t| t.date).collect();
        assert_eq!(days, vec![date(2024, 10, 31), date(2024, 10, 1)]);

        let everyone = projection
            .transactions_in_period(None, date(2024, 10, 1), date(2024, 10, 31))
            .unwrap();
        assert_eq!(everyone.len(), 3);

        assert!(matches!(
            projection.transactions_in_period(None, date(2024, 11, 1), date(2024, 10, 1)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn debit_types_total_by_absolute_value() {
        let m = Uuid::new_v4();
        let on = date(2024, 10, 5);
        let transactions = vec![
            trx(m, on, TransactionType::Simpanan, 50_000),
            trx(m, on, TransactionType::Simpanan, 1_500_000),
            trx(m, on, TransactionType::Pinjaman, -10_000_000),
            trx(m, on, TransactionType::Pinjaman, -2_000_000),
            trx(m, on, TransactionType::Penarikan, -250_000),
            trx(m, on, TransactionType::Pembayaran, 363_333),
        ];
        let totals = monthly_totals(&transactions);
        assert_eq!(totals[&TransactionType::Simpanan], rupiah(1_550_000));
        assert_eq!(totals[&TransactionType::Pinjaman], rupiah(12_000_000));
        assert_eq!(totals[&TransactionType::Penarikan], rupiah(250_000));
        assert_eq!(totals[&TransactionType::Pembayaran], rupiah(363_333));
        assert_eq!(type_total(&transactions, TransactionType::Pinjaman), rupiah(12_000_000));
    }

    #[test]
    fn monthly_report_covers_whole_calendar_month() {
        let m = Uuid::new_v4();
        let projection = LedgerProjection::new(
            vec![],
            vec![],
            vec![
                trx(m, date(2024, 2, 1), TransactionType::Simpanan, 100_000),
                trx(m, date(2024, 2, 29), TransactionType::Pinjaman, -1_000_000),
                trx(m, date(2024, 3, 1), TransactionType::Simpanan, 999),
                trx(m, date(2023, 12, 31), TransactionType::Simpanan, 1),
            ],
            vec![],
        );
        let report = projection.period_report(2024, 2).unwrap();
        assert_eq!(report.end, date(2024, 2, 29));
        assert_eq!(report.transactions.len(), 2);
        assert_eq!(report.mutasi_simpanan, rupiah(100_000));
        assert_eq!(report.mutasi_pinjaman, rupiah(1_000_000));

        let december = projection.period_report(2023, 12).unwrap();
        assert_eq!(december.end, date(2023, 12, 31));
        assert_eq!(december.mutasi_simpanan, rupiah(1));

        assert!(projection.period_report(2024, 13).is_err());
    }

    #[test]
    fn register_joins_names_and_filters() {
        let budi = member("Budi Santoso", MemberStatus::Active);
        let siti = member("Siti Aminah", MemberStatus::Active);
        let projection = LedgerProjection::new(
            vec![budi.clone(), siti.clone()],
            vec![
                loan(budi.id, 1, LoanStatus::Pending, 10),
                loan(budi.id, 2, LoanStatus::Approved, 5),
                loan(siti.id, 3, LoanStatus::Pending, 1),
            ],
            vec![],
            vec![],
        );

        let all = projection.loan_register(None, None);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].member_name.as_deref(), Some("Siti Aminah"));

        let budi_loans = projection.loan_register(Some("  sAnToSo"), None);
        assert_eq!(budi_loans.len(), 2);

        let budi_pending = projection.loan_register(Some("budi"), Some(LoanStatus::Pending));
        assert_eq!(budi_pending.len(), 1);
        assert_eq!(budi_pending[0].loan.amount, rupiah(1));
    }

    #[test]
    fn directory_searches_name_and_code() {
        let mut budi = member("Budi Santoso", MemberStatus::Active);
        budi.member_code = Some("KSP-2024-0012".to_string());
        budi.created_at = Utc::now() - Duration::days(3);
        let mut ani = member("Ani Wijaya", MemberStatus::Pending);
        ani.created_at = Utc::now() - Duration::days(1);
        let mut dewi = member("Dewi", MemberStatus::Inactive);
        dewi.member_code = Some("KSP-2023-0040".to_string());
        dewi.created_at = Utc::now() - Duration::days(2);
        let projection = LedgerProjection::new(
            vec![budi.clone(), ani.clone(), dewi.clone()],
            vec![],
            vec![],
            vec![],
        );

        let names: Vec<String> = projection
            .member_directory(None, None)
            .into_iter()
            .map(|m| m.full_name)
            .collect();
        assert_eq!(names, vec!["Ani Wijaya", "Dewi", "Budi Santoso"]);

        let by_code = projection.member_directory(Some("ksp-2024"), None);
        assert_eq!(by_code, vec![budi]);
        let pending = projection.member_directory(None, Some(MemberStatus::Pending));
        assert_eq!(pending, vec![ani]);
        assert!(projection.member_directory(Some("dewi"), Some(MemberStatus::Active)).is_empty());
    }

    #[test]
    fn same_day_entries_keep_a_stable_order() {
        let m = Uuid::new_v4();
        let on = date(2024, 10, 5);
        let transactions: Vec<Transaction> = (0..6)
            .map(|_| trx(m, on, TransactionType::Simpanan, 10_000))
            .collect();
        let mut expected: Vec<Uuid> = transactions.iter().map(|t| t.id).collect();
        expected.sort();
        expected.reverse();

        let mut shuffled = transactions.clone();
        shuffled.reverse();
        for set in [transactions, shuffled] {
            let projection = LedgerProjection::new(vec![], vec![], set, vec![]);
            let ids: Vec<Uuid> = projection
                .transactions_in_period(None, on, on)
                .unwrap()
                .iter()
                .map(|t| t.id)
                .collect();
            assert_eq!(ids, expected);
        }
    }

    #[tokio::test]
    async fn member_savings_split_by_type() {
        let store = InMemoryStore::new();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        for (member_id, kind, balance) in [
            (me, SavingsType::Pokok, 500_000),
            (me, SavingsType::Wajib, 2_000_000),
            (me, SavingsType::Sukarela, 10_000_000),
            (other, SavingsType::Sukarela, 99),
        ] {
            store
                .upsert_savings(SavingsAccount {
                    member_id,
                    kind,
                    balance: rupiah(balance),
                })
                .await
                .unwrap();
        }

        let savings = MemberSavings::load(&store, me).await.unwrap();
        assert_eq!(savings.pokok, rupiah(500_000));
        assert_eq!(savings.wajib, rupiah(2_000_000));
        assert_eq!(savings.sukarela, rupiah(10_000_000));
        assert_eq!(savings.total, rupiah(12_500_000));

        let nobody = MemberSavings::load(&store, Uuid::new_v4()).await.unwrap();
        assert_eq!(nobody.total, Decimal::ZERO);
    }

    #[tokio::test]
    async fn loads_from_store() {
        let store = InMemoryStore::new();
        let active = store.insert_member(member("Budi", MemberStatus::Active)).await.unwrap();
        store.insert_member(member("Ani", MemberStatus::Pending)).await.unwrap();
        store
            .insert_loan(loan(active.id, 5_000_000, LoanStatus::Approved, 1))
            .await
            .unwrap();
        store
            .upsert_savings(SavingsAccount {
                member_id: active.id,
                kind: SavingsType::Sukarela,
                balance: rupiah(750_000),
            })
            .await
            .unwrap();

        let summary = LedgerProjection::load(&store).await.unwrap().summary();
        assert_eq!(
            summary,
            DashboardSummary {
                active_members: 1,
                pending_members: 1,
                total_savings: rupiah(750_000),
                total_disbursed: rupiah(5_000_000),
                outstanding_receivable: rupiah(5_000_000),
                pending_loans: 0,
            }
        );

        store.set_unavailable(true);
        assert!(matches!(
            LedgerProjection::load(&store).await,
            Err(Error::StoreUnavailable(_))
        ));
    }
}
