pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod server;
pub mod storage;

pub use application::{LedgerError, LedgerService, TransactionRequest};
pub use domain::*;
pub use storage::Repository;
