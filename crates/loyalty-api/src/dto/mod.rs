//! Request and response bodies
//!
//! Listings reuse the domain read models (`OrderRecord`, `Balance`,
//! `WithdrawalRecord`) directly.

pub mod auth;
pub mod balance;

pub use auth::*;
pub use balance::*;
