use ksp_core::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 1.5% flat per month.
pub const DEFAULT_MONTHLY_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 3);

/// Tenors offered by the application and simulation forms. Any positive term is accepted.
pub const STANDARD_TENORS: [u32; 4] = [6, 12, 24, 36];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoanTerms {
    pub monthly_payment: Decimal,
    pub total_payment: Decimal,
    pub total_interest: Decimal,
}

/// Per-month split shown on the application screen. The two parts add up to the monthly
/// payment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentBreakdown {
    pub principal_per_month: Decimal,
    pub interest_per_month: Decimal,
}

/// Converts a percentage such as `1.5` into the fractional rate `0.015`.
pub fn rate_from_percent(percent: Decimal) -> Decimal {
    percent / Decimal::ONE_HUNDRED
}

fn validate(amount: Decimal, term_months: u32, monthly_rate: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidInput(format!(
            "loan amount must be positive, got {amount}"
        )));
    }
    if term_months == 0 {
        return Err(Error::InvalidInput(
            "loan term must be at least one month".to_string(),
        ));
    }
    if monthly_rate < Decimal::ZERO {
        return Err(Error::InvalidInput(format!(
            "monthly rate must not be negative, got {monthly_rate}"
        )));
    }
    Ok(())
}

fn overflow() -> Error {
    Error::InvalidInput("loan terms exceed representable range".to_string())
}

/// Flat-rate terms: interest accrues on the original principal every month.
pub fn compute_terms(amount: Decimal, term_months: u32, monthly_rate: Decimal) -> Result<LoanTerms> {
    validate(amount, term_months, monthly_rate)?;
    let term = Decimal::from(term_months);

    let total_interest = amount
        .checked_mul(monthly_rate)
        .and_then(|v| v.checked_mul(term))
        .ok_or_else(overflow)?;
    let total_payment = amount.checked_add(total_interest).ok_or_else(overflow)?;
    let monthly_payment = total_payment.checked_div(term).ok_or_else(overflow)?;

    Ok(LoanTerms {
        monthly_payment,
        total_payment,
        total_interest,
    })
}

pub fn installment_breakdown(
    amount: Decimal,
    term_months: u32,
    monthly_rate: Decimal,
) -> Result<InstallmentBreakdown> {
    validate(amount, term_months, monthly_rate)?;
    let principal_per_month = amount
        .checked_div(Decimal::from(term_months))
        .ok_or_else(overflow)?;
    let interest_per_month = amount.checked_mul(monthly_rate).ok_or_else(overflow)?;

    Ok(InstallmentBreakdown {
        principal_per_month,
        interest_per_month,
    })
}
