//! Loyalty Types - Domain vocabulary for the loyalty points program
//!
//! This crate has no dependencies on other loyalty crates. It defines:
//!
//! - Order numbers and their checksum validation
//! - Order status lifecycle and order kinds (purchase vs. withdrawal)
//! - Ledger-derived read models (balance, order and withdrawal records)
//!
//! # Order Lifecycle
//!
//! ```text
//! NEW ──► PROCESSING ──► PROCESSED
//!  │           │
//!  │           └───────► INVALID
//!  └──► PROCESSED | INVALID   (direct decision)
//! ```
//!
//! `PROCESSED` and `INVALID` are terminal. Storage layers map these variants
//! to their own representation at their boundary.

pub mod balance;
pub mod error;
pub mod order;

pub use balance::*;
pub use error::*;
pub use order::*;

/// Identifier of a registered user
pub type UserId = uuid::Uuid;
