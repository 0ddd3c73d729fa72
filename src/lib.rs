//! HedgeAI: portfolio risk desk API
//!
//! This is the root crate that provides benchmark and integration-test access
//! to the internal crates. For actual functionality, use them directly:
//!
//! - `auth`: credential store, JWT issuing and rotation, role gate, audit logging
//! - `portfolio-core`: portfolio domain types, repositories, ML service client
//! - `api-server`: REST API server

// Re-export for benchmarks
pub use auth;
pub use portfolio_core as core;
pub use api_server as server;
