pub mod app;
pub mod backend;
pub mod classify;
pub mod config;
pub mod http;
pub mod metrics;
pub mod model;
pub mod poller;
pub mod recommendations;
pub mod session;
pub mod state;

pub use classify::{FleetSummary, HealthCategory, Verdict, VerdictSet};
pub use state::{FleetView, SharedState};
