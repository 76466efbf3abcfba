use std::sync::Arc;

pub mod actor;
pub mod cloud_provider;
pub mod config;
pub mod error;
pub mod node_groups;
pub mod rate_limit;

pub use error::{Error, Result};

pub type AppConfig = Arc<config::Config>;
