//! Seat-hold subsystem: guarantees zero double-booking for scheduled-event
//! ticket sales under a bounded payment-hold window.
//!
//! # Modules
//!
//! - [`holds`] - C1-C9: identifier mint, record store, lock/overlay store,
//!   event log, expiry signaler, state-transition consumer, reconciler,
//!   hold orchestrator, read assembler.
//! - [`db`] - PostgreSQL connection pool management.
//! - [`config`] - environment-driven application configuration.
//! - [`logging`] - structured logging setup.
//! - [`http`] - the axum router exposing the orchestrator/read assembler.

pub mod config;
pub mod db;
pub mod holds;
pub mod http;
pub mod logging;

pub use holds::error::HoldError;
pub use holds::orchestrator::HoldOrchestrator;
pub use holds::read_assembler::ReadAssembler;
pub use holds::reconciler::{Reconciler, ReconcilerConfig};
