//! Relaypost daemon library.
//!
//! Exposes the daemon's internal modules for integration testing.
//! In production the daemon runs as a binary (`main.rs`), which parses
//! CLI arguments and hands control to the [`orchestrator`].

pub mod cli;
pub mod health;
pub mod logging;
pub mod metrics_server;
pub mod modules;
pub mod orchestrator;
