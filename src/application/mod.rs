// Application layer: the ledger engine and its error taxonomy.
// Transports (CLI, HTTP) call into `LedgerService` and never touch the
// repository directly.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
