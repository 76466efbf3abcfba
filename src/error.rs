use crate::cloud_provider;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Malformed node group spec {spec:?}: {reason}")]
    MalformedSpec { spec: String, reason: String },
    #[error("Unsupported auto discovery spec {0:?}, expected the `label:` prefix")]
    UnsupportedDiscoveryPrefix(String),
    #[error("Invalid selector pair {pair:?} in auto discovery spec {spec:?}")]
    InvalidSelectorPair { spec: String, pair: String },
    #[error("Failed to {operation} in resource group {resource_group}")]
    InventoryQueryFailed {
        operation: &'static str,
        resource_group: String,
        #[source]
        source: cloud_provider::Error,
    },
    #[error("Failed to {operation} within {timeout:?}")]
    DeadlineExceeded {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("no minimum size specified for vmss: {0}")]
    MissingMinimumSize(String),
    #[error("no maximum size specified for vmss: {0}")]
    MissingMaximumSize(String),
    #[error("invalid minimum size specified for vmss: {name}: {source}")]
    InvalidMinimumSize {
        name: String,
        source: std::num::ParseIntError,
    },
    #[error("invalid maximum size specified for vmss: {name}: {source}")]
    InvalidMaximumSize {
        name: String,
        source: std::num::ParseIntError,
    },
    #[error("minimum size must be a non-negative number of nodes, got {min} for vmss: {name}")]
    NegativeMinimumSize { name: String, min: i64 },
    #[error("maximum size must be greater than minimum size, got min {min} and max {max} for vmss: {name}")]
    MaximumNotGreaterThanMinimum { name: String, min: i64, max: i64 },
    #[error("Failed to parse {var}={value:?}: {reason}")]
    InvalidRateLimitEnvValue {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("Unsupported vm type {0:?}, only `vmss` is supported")]
    UnsupportedVmType(String),
}
