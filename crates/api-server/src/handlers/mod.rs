//! API request handlers.

pub mod alerts;
pub mod analytics;
pub mod auth;
pub mod health;
pub mod portfolios;
pub mod positions;
pub mod trades;
pub mod users;
