use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MemberStatus {
    Pending,
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: Uuid,
    /// Human-readable code such as `KSP-2024-0012`. Unset while the member is pending.
    pub member_code: Option<String>,
    pub full_name: String,
    pub phone: String,
    pub address: String,
    pub status: MemberStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: Uuid,
    pub member_id: Uuid,
    pub amount: Decimal,
    pub term_months: u32,
    /// Flat rate per month as a fraction, `0.015` for 1.5%.
    pub monthly_rate: Decimal,
    pub start_date: NaiveDate,
    pub status: LoanStatus,
    pub monthly_payment: Decimal,
    pub total_payment: Decimal,
    pub remaining_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionType {
    Simpanan,
    Pinjaman,
    Penarikan,
    Pembayaran,
}

impl TransactionType {
    pub const ALL: [TransactionType; 4] = [
        TransactionType::Simpanan,
        TransactionType::Pinjaman,
        TransactionType::Penarikan,
        TransactionType::Pembayaran,
    ];

    /// Entries of these types are recorded with a negative amount; reports total them by
    /// absolute value.
    pub fn is_debit(self) -> bool {
        matches!(self, TransactionType::Pinjaman | TransactionType::Penarikan)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionStatus {
    Berhasil,
    Pending,
    Gagal,
}

/// Immutable ledger entry. Only `status` may change after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub member_id: Uuid,
    pub date: NaiveDate,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Signed: positive credits the member, negative debits.
    pub amount: Decimal,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SavingsType {
    Pokok,
    Wajib,
    Sukarela,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SavingsAccount {
    pub member_id: Uuid,
    pub kind: SavingsType,
    pub balance: Decimal,
}
