//! The one place where snake_case table rows become core records.

use std::str::FromStr;

use ksp_core::{Error, Loan, Member, Result, SavingsAccount, Transaction};
use sqlx::Row;
use sqlx::postgres::PgRow;

pub(crate) const MEMBER_COLUMNS: &str =
    "id, member_code, full_name, phone, address, status, created_at";
pub(crate) const LOAN_COLUMNS: &str = "id, member_id, amount, term_months, monthly_rate, \
     start_date, status, monthly_payment, total_payment, remaining_amount, created_at";
pub(crate) const TRANSACTION_COLUMNS: &str =
    "id, member_id, date, description, type, amount, status";
pub(crate) const SAVINGS_COLUMNS: &str = "member_id, kind, balance";

fn malformed(table: &str, detail: impl std::fmt::Display) -> Error {
    Error::StoreUnavailable(format!("malformed {table} row: {detail}"))
}

fn column<'r, T>(row: &'r PgRow, table: &str, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name).map_err(|e| malformed(table, e))
}

fn parsed<T: FromStr<Err = strum::ParseError>>(row: &PgRow, table: &str, name: &str) -> Result<T> {
    let raw: String = column(row, table, name)?;
    wire_name(table, name, &raw)
}

fn wire_name<T: FromStr<Err = strum::ParseError>>(table: &str, name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|e| Error::InvalidInput(format!("{table}.{name} holds `{raw}`: {e}")))
}

pub fn member_from_row(row: &PgRow) -> Result<Member> {
    Ok(Member {
        id: column(row, "profiles", "id")?,
        member_code: column(row, "profiles", "member_code")?,
        full_name: column(row, "profiles", "full_name")?,
        phone: column(row, "profiles", "phone")?,
        address: column(row, "profiles", "address")?,
        status: parsed(row, "profiles", "status")?,
        created_at: column(row, "profiles", "created_at")?,
    })
}

pub fn loan_from_row(row: &PgRow) -> Result<Loan> {
    let term_months: i32 = column(row, "loans", "term_months")?;
    Ok(Loan {
        id: column(row, "loans", "id")?,
        member_id: column(row, "loans", "member_id")?,
        amount: column(row, "loans", "amount")?,
        term_months: u32::try_from(term_months).map_err(|e| malformed("loans", e))?,
        monthly_rate: column(row, "loans", "monthly_rate")?,
        start_date: column(row, "loans", "start_date")?,
        status: parsed(row, "loans", "status")?,
        monthly_payment: column(row, "loans", "monthly_payment")?,
        total_payment: column(row, "loans", "total_payment")?,
        remaining_amount: column(row, "loans", "remaining_amount")?,
        created_at: column(row, "loans", "created_at")?,
    })
}

pub fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    Ok(Transaction {
        id: column(row, "transactions", "id")?,
        member_id: column(row, "transactions", "member_id")?,
        date: column(row, "transactions", "date")?,
        description: column(row, "transactions", "description")?,
        kind: parsed(row, "transactions", "type")?,
        amount: column(row, "transactions", "amount")?,
        status: parsed(row, "transactions", "status")?,
    })
}

pub fn savings_from_row(row: &PgRow) -> Result<SavingsAccount> {
    Ok(SavingsAccount {
        member_id: column(row, "savings", "member_id")?,
        kind: parsed(row, "savings", "kind")?,
        balance: column(row, "savings", "balance")?,
    })
}

pub(crate) fn term_to_db(term_months: u32) -> Result<i32> {
    i32::try_from(term_months)
        .map_err(|_| Error::InvalidInput(format!("term of {term_months} months is too long")))
}

#[cfg(test)]
mod tests {
    use ksp_core::{LoanStatus, MemberStatus, TransactionType};

    use super::*;

    #[test]
    fn term_fits_integer_column() {
        assert_eq!(term_to_db(36).unwrap(), 36);
        assert!(matches!(term_to_db(u32::MAX), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn unknown_wire_names_are_invalid_input() {
        let status: LoanStatus = wire_name("loans", "status", "approved").unwrap();
        assert_eq!(status, LoanStatus::Approved);
        let kind: TransactionType = wire_name("transactions", "type", "penarikan").unwrap();
        assert_eq!(kind, TransactionType::Penarikan);

        let err = wire_name::<MemberStatus>("profiles", "status", "archived").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(message) if message.contains("archived")));
    }

    #[test]
    fn column_lists_match_table_shape() {
        assert_eq!(LOAN_COLUMNS.split(", ").count(), 11);
        assert!(TRANSACTION_COLUMNS.contains("type"));
        assert!(MEMBER_COLUMNS.starts_with("id, member_code"));
    }
}
