//! IKU prediction agent
//!
//! Serves hybrid predictions from a model artifact loaded once at startup.

pub mod api;
pub mod config;
