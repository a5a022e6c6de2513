//! Paper-mode runner for the position lifecycle engine.
//!
//! Wires the in-memory store, one [`PaperExchange`](ocbot_exchange::PaperExchange)
//! per configured bot, the order coordinator, the exit placer, the trailing
//! service and the position reconciler, then drives them on timers:
//! - reconcile passes on `reconcile.sync_interval_secs`
//! - trailing take-profit steps on `trailing.interval_secs`
//! - paper trigger-order fills on `paper.fill_interval_ms`

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, CycleReport};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
