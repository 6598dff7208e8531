use chrono::{NaiveDate, Utc};
use ksp_core::{
    Error, Loan, LoanStatus, LoanStore, MemberStatus, MemberStore, Result, Session,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::terms::compute_terms;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplication {
    pub member_id: Uuid,
    pub amount: Decimal,
    pub term_months: u32,
    pub monthly_rate: Decimal,
    pub start_date: NaiveDate,
}

/// Whether a loan may move from `from` to `to`.
pub fn is_legal_transition(from: LoanStatus, to: LoanStatus) -> bool {
    matches!(
        (from, to),
        (LoanStatus::Pending, LoanStatus::Approved)
            | (LoanStatus::Pending, LoanStatus::Rejected)
            | (LoanStatus::Approved, LoanStatus::Paid)
    )
}

/// Loan state machine over a member and loan store. Every method performs at most one write.
pub struct LoanLifecycle<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> LoanLifecycle<'a, S>
where
    S: LoanStore + MemberStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn submit(&self, session: &Session, application: LoanApplication) -> Result<Loan> {
        session.require_self_or_admin(application.member_id, "submitting a loan")?;
        let terms = compute_terms(
            application.amount,
            application.term_months,
            application.monthly_rate,
        )?;
        self.require_active_member(application.member_id).await?;

        let loan = Loan {
            id: Uuid::new_v4(),
            member_id: application.member_id,
            amount: application.amount,
            term_months: application.term_months,
            monthly_rate: application.monthly_rate,
            start_date: application.start_date,
            status: LoanStatus::Pending,
            monthly_payment: terms.monthly_payment,
            total_payment: terms.total_payment,
            remaining_amount: terms.total_payment,
            created_at: Utc::now(),
        };
        let loan = self.store.insert_loan(loan).await?;
        info!(
            "loan {} submitted for member {} ({} over {} months)",
            loan.id, loan.member_id, loan.amount, loan.term_months
        );
        Ok(loan)
    }

    /// Replaces the terms of a pending application and recomputes every derived field.
    pub async fn revise(
        &self,
        session: &Session,
        loan_id: Uuid,
        amount: Decimal,
        term_months: u32,
        monthly_rate: Decimal,
        start_date: NaiveDate,
    ) -> Result<Loan> {
        session.require_admin("revising a loan")?;
        let mut loan = self.load(loan_id).await?;
        if loan.status != LoanStatus::Pending {
            return Err(Error::illegal_transition("loan", loan.id, loan.status, "revised"));
        }
        let terms = compute_terms(amount, term_months, monthly_rate)?;

        loan.amount = amount;
        loan.term_months = term_months;
        loan.monthly_rate = monthly_rate;
        loan.start_date = start_date;
        loan.monthly_payment = terms.monthly_payment;
        loan.total_payment = terms.total_payment;
        loan.remaining_amount = terms.total_payment;

        let loan = self.write(loan, LoanStatus::Pending, "revised").await?;
        info!("loan {} revised to {} over {} months", loan.id, loan.amount, loan.term_months);
        Ok(loan)
    }

    pub async fn approve(&self, session: &Session, loan_id: Uuid) -> Result<Loan> {
        session.require_admin("approving a loan")?;
        self.transition(loan_id, LoanStatus::Approved).await
    }

    pub async fn reject(&self, session: &Session, loan_id: Uuid) -> Result<Loan> {
        session.require_admin("rejecting a loan")?;
        self.transition(loan_id, LoanStatus::Rejected).await
    }

    /// Settles an approved loan. Partial payments are not modelled, so the remaining amount
    /// collapses straight to zero.
    pub async fn mark_paid(&self, session: &Session, loan_id: Uuid) -> Result<Loan> {
        session.require_admin("marking a loan paid")?;
        self.transition(loan_id, LoanStatus::Paid).await
    }

    /// Removes a loan in any state and returns the removed record.
    pub async fn delete(&self, session: &Session, loan_id: Uuid) -> Result<Loan> {
        session.require_admin("deleting a loan")?;
        let loan = self.load(loan_id).await?;
        if !self.store.delete_loan(loan_id).await? {
            return Err(Error::NotFound {
                entity: "loan",
                id: loan_id,
            });
        }
        if loan.status == LoanStatus::Approved {
            warn!(
                "approved loan {} deleted with {} outstanding",
                loan.id, loan.remaining_amount
            );
        } else {
            info!("loan {} deleted while {}", loan.id, loan.status);
        }
        Ok(loan)
    }

    async fn transition(&self, loan_id: Uuid, to: LoanStatus) -> Result<Loan> {
        let mut loan = self.load(loan_id).await?;
        let from = loan.status;
        if !is_legal_transition(from, to) {
            return Err(Error::illegal_transition("loan", loan.id, from, to));
        }
        loan.status = to;
        if to == LoanStatus::Paid {
            loan.remaining_amount = Decimal::ZERO;
        }
        let loan = self.write(loan, from, to).await?;
        info!("loan {} is now {}", loan.id, loan.status);
        Ok(loan)
    }

    /// Stores `loan` only if the record is still `expected`. A concurrent change in between
    /// surfaces as `IllegalTransition` from whatever status won.
    async fn write(&self, loan: Loan, expected: LoanStatus, to: impl ToString) -> Result<Loan> {
        let loan_id = loan.id;
        match self.store.update_loan_if(loan, expected).await? {
            Some(loan) => Ok(loan),
            None => {
                let current = self.load(loan_id).await?;
                Err(Error::illegal_transition("loan", loan_id, current.status, to))
            }
        }
    }

    async fn load(&self, loan_id: Uuid) -> Result<Loan> {
        self.store.loan(loan_id).await?.ok_or(Error::NotFound {
            entity: "loan",
            id: loan_id,
        })
    }

    async fn require_active_member(&self, member_id: Uuid) -> Result<()> {
        match self.store.member(member_id).await? {
            Some(member) if member.status == MemberStatus::Active => Ok(()),
            Some(member) => Err(Error::ValidationError(format!(
                "member {member_id} is {} and cannot apply for a loan",
                member.status
            ))),
            None => Err(Error::ValidationError(format!(
                "member {member_id} does not exist"
            ))),
        }
    }
}
