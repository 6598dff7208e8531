pub mod error;
pub mod models;
pub mod money;
pub mod session;
pub mod storage;

pub use error::{Error, Result};
pub use models::{
    Loan, LoanStatus, Member, MemberStatus, SavingsAccount, SavingsType, Transaction,
    TransactionStatus, TransactionType,
};
pub use money::{round_currency, round_rupiah};
pub use session::{Role, Session};
pub use storage::{
    LoanQuery, LoanStore, MemberCodeSequence, MemberStore, SavingsStore, SortOrder, Store,
    TransactionQuery, TransactionStore,
};
