//! Repository implementations

mod ledger;
mod order;
mod user;

pub use ledger::LedgerRepo;
pub use order::OrderRepo;
pub use user::UserRepo;
