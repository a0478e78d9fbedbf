// src/health/mod.rs
mod report;
mod status;

pub use report::{CheckHealth, CheckKey, HealthReport, HealthResponse, ModuleHealth};
pub use status::HealthStatus;
