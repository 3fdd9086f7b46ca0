//! Telegram adapters.
//!
//! - [`gateway::GatewayProvider`] implements the `mlk-core` MessagingProvider
//!   for the engagement account through an HTTP gateway.
//! - [`router::run_polling`] serves the operator control bot (teloxide).

pub mod gateway;
pub mod handlers;
pub mod router;

pub use gateway::GatewayProvider;
