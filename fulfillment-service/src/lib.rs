//! Fulfillment service library.

pub mod config;
pub mod services;
