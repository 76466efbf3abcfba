use crate::cloud_provider::{Error, Result, ScaleSetClient, ScaleSetVm, VirtualMachineScaleSet};
use anyhow::ensure;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Inventory backed by one YAML file per resource group (`<resource_group>.yml`).
pub struct FileScaleSetClient {
    directory: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ScaleSetRecord {
    #[serde(flatten)]
    scale_set: VirtualMachineScaleSet,
    #[serde(default)]
    vms: Vec<ScaleSetVm>,
}

impl FileScaleSetClient {
    pub fn new(directory: impl AsRef<Path>) -> anyhow::Result<Self> {
        let directory = directory.as_ref();
        ensure!(
            directory.is_dir(),
            "Inventory directory {} does not exist",
            directory.display()
        );

        info!(path = %directory.display(), "Using file based scale set inventory");

        Ok(Self {
            directory: directory.into(),
        })
    }

    async fn read_inventory(&self, resource_group: &str) -> Result<Vec<ScaleSetRecord>> {
        let path = self.directory.join(format!("{}.yml", resource_group));
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;

        serde_yaml::from_str(&content).map_err(|source| Error::Deserialization { path, source })
    }

    async fn find(&self, resource_group: &str, name: &str) -> Result<ScaleSetRecord> {
        self.read_inventory(resource_group)
            .await?
            .into_iter()
            .find(|record| record.scale_set.name == name)
            .ok_or_else(|| Error::ScaleSetNotFound {
                resource_group: resource_group.into(),
                name: name.into(),
            })
    }
}

#[async_trait]
impl ScaleSetClient for FileScaleSetClient {
    #[tracing::instrument(
        name = "FileScaleSetClient::list_scale_sets",
        skip(self),
        fields(path = %self.directory.display())
    )]
    async fn list_scale_sets(&self, resource_group: &str) -> Result<Vec<VirtualMachineScaleSet>> {
        Ok(self
            .read_inventory(resource_group)
            .await?
            .into_iter()
            .map(|record| record.scale_set)
            .collect())
    }

    #[tracing::instrument(name = "FileScaleSetClient::get_scale_set", skip(self))]
    async fn get_scale_set(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<VirtualMachineScaleSet> {
        Ok(self.find(resource_group, name).await?.scale_set)
    }

    #[tracing::instrument(name = "FileScaleSetClient::list_scale_set_vms", skip(self))]
    async fn list_scale_set_vms(
        &self,
        resource_group: &str,
        scale_set: &str,
    ) -> Result<Vec<ScaleSetVm>> {
        Ok(self.find(resource_group, scale_set).await?.vms)
    }
}

impl fmt::Display for FileScaleSetClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileScaleSetClient ({})", self.directory.to_string_lossy())
    }
}

impl fmt::Debug for FileScaleSetClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"
- name: workers
  capacity: 3
  tags:
    pool: workers
    min: "1"
    max: "10"
  vms:
    - id: /subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachineScaleSets/workers/virtualMachines/0
      instance_id: "0"
- name: system
"#;

    fn inventory_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "vmss-node-groups-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("rg.yml"), INVENTORY).unwrap();
        dir
    }

    #[test]
    fn missing_directory_is_rejected() {
        assert!(FileScaleSetClient::new("/nonexistent/vmss-node-groups").is_err());
    }

    #[tokio::test]
    async fn reads_scale_sets_and_vms() {
        let client = FileScaleSetClient::new(inventory_dir("read")).unwrap();

        let scale_sets = client.list_scale_sets("rg").await.unwrap();
        assert_eq!(scale_sets.len(), 2);
        assert_eq!(scale_sets[0].name, "workers");
        assert_eq!(scale_sets[0].capacity, 3);
        assert_eq!(scale_sets[0].tags.get("min").map(String::as_str), Some("1"));
        assert!(scale_sets[1].tags.is_empty());

        let vms = client.list_scale_set_vms("rg", "workers").await.unwrap();
        assert_eq!(vms.len(), 1);
        assert_eq!(vms[0].instance_id, "0");

        assert_eq!(client.get_scale_set("rg", "system").await.unwrap().capacity, 0);
    }

    #[tokio::test]
    async fn unknown_resource_group_and_scale_set_fail() {
        let client = FileScaleSetClient::new(inventory_dir("unknown")).unwrap();

        assert!(matches!(
            client.list_scale_sets("other").await,
            Err(Error::Io { .. })
        ));
        assert!(matches!(
            client.get_scale_set("rg", "missing").await,
            Err(Error::ScaleSetNotFound { .. })
        ));
    }
}
