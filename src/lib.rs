// src/lib.rs
pub mod clock;
pub mod config;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod validation;
