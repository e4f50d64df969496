//! Request handlers, one module per resource

pub mod auth;
pub mod balance;
pub mod health;
pub mod orders;
