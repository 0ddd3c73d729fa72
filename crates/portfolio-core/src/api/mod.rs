//! API clients for external services.

pub mod ml;

pub use ml::{MlClient, RiskModel};
