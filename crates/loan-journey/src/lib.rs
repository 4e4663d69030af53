pub mod config;
pub mod error;
pub mod journey;
pub mod telemetry;
