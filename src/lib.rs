//! Farmhand: multi-account command orchestration for chat-driven economy
//! services.
//!
//! Each configured account runs an independent session that works, collects
//! role income, pays a tier-based commission and sweeps its cash into the
//! bank. Replies arrive asynchronously on a shared channel and are classified
//! by [`classifier`] before the session decides its next step.

pub mod account;
pub mod bootstrap;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod report;
pub mod session;
pub mod settings;
pub mod tally;
pub mod transport;

pub use account::{CommissionRates, Credential, Tier};
pub use coordinator::{Coordinator, RunSummary};
