pub mod config;
pub mod db;
pub mod pg_store;
pub mod rows;

pub use config::ServiceConfig;
pub use db::{connect_database, ensure_schema};
pub use pg_store::PgStore;
pub use rows::{loan_from_row, member_from_row, savings_from_row, transaction_from_row};
