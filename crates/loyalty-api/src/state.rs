//! Application state shared across handlers

use std::sync::Arc;

use loyalty_accrual::AgentHealth;
use loyalty_auth::{AuthConfig, AuthResult, JwtService, PasswordService};
use loyalty_db::{LedgerStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub users: Arc<dyn UserStore>,
    pub passwords: PasswordService,
    pub jwt: JwtService,
    /// Reconciliation agent health, reported by `/health`
    pub agent: Arc<AgentHealth>,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        users: Arc<dyn UserStore>,
        auth: &AuthConfig,
        agent: Arc<AgentHealth>,
    ) -> AuthResult<Self> {
        Ok(Self {
            ledger,
            users,
            passwords: PasswordService::new(auth.password.clone()),
            jwt: JwtService::new(&auth.jwt)?,
            agent,
        })
    }
}
