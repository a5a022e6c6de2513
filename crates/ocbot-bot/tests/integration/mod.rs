//! Integration tests for ocbot-bot.
//!
//! These drive the wired application against paper exchanges:
//! - reconcile, exit placement and paper fills end to end
//! - trailing take-profit replacement across cycles
//! - per-bot failure isolation

pub mod common;
