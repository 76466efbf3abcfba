mod file;
mod mock;
mod rate_limited;

use crate::config;
use crate::AppConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub use file::FileScaleSetClient;
pub use mock::MockScaleSetClient;
pub use rate_limited::RateLimitedClient;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Scale set {name} not found in resource group {resource_group}")]
    ScaleSetNotFound {
        resource_group: String,
        name: String,
    },
    #[error("Failed to read inventory {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to deserialize inventory {path}")]
    Deserialization {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Inventory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VirtualMachineScaleSet {
    pub name: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub capacity: u64,
}

impl VirtualMachineScaleSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: HashMap::new(),
            capacity: 0,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScaleSetVm {
    pub id: String,
    #[serde(default)]
    pub instance_id: String,
}

/// Read access to the scale set inventory of a cloud account.
#[async_trait]
pub trait ScaleSetClient: Send + Sync + fmt::Debug {
    async fn list_scale_sets(&self, resource_group: &str) -> Result<Vec<VirtualMachineScaleSet>>;
    async fn get_scale_set(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<VirtualMachineScaleSet>;
    async fn list_scale_set_vms(
        &self,
        resource_group: &str,
        scale_set: &str,
    ) -> Result<Vec<ScaleSetVm>>;
}

pub fn build_from_config(config: AppConfig) -> anyhow::Result<Arc<dyn ScaleSetClient>> {
    let client: Arc<dyn ScaleSetClient> = match &config.scale_set_provider {
        config::ScaleSetProvider::Mock => Arc::new(MockScaleSetClient::new()),
        config::ScaleSetProvider::File { path } => Arc::new(FileScaleSetClient::new(path)?),
    };

    Ok(Arc::new(RateLimitedClient::new(client, &config.rate_limit)))
}
