// src/metrics/mod.rs
mod collector;

pub use collector::{CacheLookup, MetricsCollector, MetricsRegistry, ProbeResult};
