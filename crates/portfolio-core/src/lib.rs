//! Portfolio Core Library
//!
//! Domain types, database repositories and the ML service client for the
//! HedgeAI risk desk.

pub mod analytics;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod types;

pub use error::{Error, Result};
