// src/orchestrator/mod.rs
mod engine;
mod flight;

pub use engine::{EngineError, Orchestrator};
pub use flight::{FlightError, SingleFlight};
