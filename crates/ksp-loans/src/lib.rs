pub mod lifecycle;
pub mod terms;

pub use lifecycle::{LoanApplication, LoanLifecycle, is_legal_transition};
pub use terms::{
    DEFAULT_MONTHLY_RATE, InstallmentBreakdown, LoanTerms, STANDARD_TENORS, compute_terms,
    installment_breakdown, rate_from_percent,
};
