//! Incident Desk library exports

pub mod auth;
pub mod config;
pub mod relay;
pub mod report;
pub mod server;
pub mod uploads;
