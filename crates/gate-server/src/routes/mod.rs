pub mod actions;
pub mod health;
pub mod metrics;
pub mod policies;
pub mod validate;
