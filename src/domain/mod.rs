mod account;
mod integrity;
mod statement;
mod transaction;

pub use account::*;
pub use integrity::*;
pub use statement::*;
pub use transaction::*;
