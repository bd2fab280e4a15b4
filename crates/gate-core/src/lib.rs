pub mod alert;
pub mod breaker;
pub mod bridge;
pub mod config;
pub mod error;
pub mod io;
pub mod judge;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod params;
pub mod policy;
pub mod screen;
pub mod secrets;
pub mod signing;
pub mod types;
pub mod validator;

pub use error::{GateError, Result, ValidationError};
pub use orchestrator::{Orchestrator, Outcome};
