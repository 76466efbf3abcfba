use crate::cloud_provider::{self, ScaleSetClient, ScaleSetVm, VirtualMachineScaleSet};
use crate::error::{Error, Result};
use crate::node_groups::spec::{ExplicitSpec, LabelSelector};
use crate::node_groups::{NodeGroup, ScaleSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MIN_SIZE_TAG: &str = "min";
pub const MAX_SIZE_TAG: &str = "max";

/// Deadline-bounded access to the scale sets of one resource group.
#[derive(Debug, Clone)]
pub struct Inventory {
    client: Arc<dyn ScaleSetClient>,
    resource_group: String,
    timeout: Duration,
}

impl Inventory {
    pub fn new(
        client: Arc<dyn ScaleSetClient>,
        resource_group: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            resource_group: resource_group.into(),
            timeout,
        }
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub async fn list_scale_sets(&self) -> Result<Vec<VirtualMachineScaleSet>> {
        self.call(
            "list scale sets",
            self.client.list_scale_sets(&self.resource_group),
        )
        .await
    }

    pub async fn get_scale_set(&self, name: &str) -> Result<VirtualMachineScaleSet> {
        self.call(
            "get scale set",
            self.client.get_scale_set(&self.resource_group, name),
        )
        .await
    }

    pub async fn list_scale_set_vms(&self, name: &str) -> Result<Vec<ScaleSetVm>> {
        self.call(
            "list scale set vms",
            self.client.list_scale_set_vms(&self.resource_group, name),
        )
        .await
    }

    async fn call<T, F>(&self, operation: &'static str, request: F) -> Result<T>
    where
        F: Future<Output = cloud_provider::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(source)) => Err(Error::InventoryQueryFailed {
                operation,
                resource_group: self.resource_group.clone(),
                source,
            }),
            Err(_) => Err(Error::DeadlineExceeded {
                operation,
                timeout: self.timeout,
            }),
        }
    }
}

/// Turns discovery specs into scale set node groups.
#[derive(Debug, Clone)]
pub struct ScaleSetResolver {
    inventory: Inventory,
}

impl ScaleSetResolver {
    pub fn new(inventory: Inventory) -> Self {
        Self { inventory }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Resolves explicit specs against a single inventory listing. Specs whose
    /// scale set does not exist are skipped.
    #[tracing::instrument(
        name = "ScaleSetResolver::resolve_explicit",
        skip(self, specs),
        fields(resource_group = %self.inventory.resource_group, specs = specs.len())
    )]
    pub async fn resolve_explicit(&self, specs: &[ExplicitSpec]) -> Result<Vec<Arc<ScaleSet>>> {
        if specs.is_empty() {
            return Ok(vec![]);
        }

        let scale_sets = self.inventory.list_scale_sets().await?;
        let mut node_groups = Vec::with_capacity(specs.len());

        for spec in specs {
            if !scale_sets
                .iter()
                .any(|s| s.name.eq_ignore_ascii_case(&spec.name))
            {
                warn!(name = %spec.name, "Scale set of explicit node group not found, skipping");
                continue;
            }

            debug!(name = %spec.name, min = spec.min_size, max = spec.max_size, "Resolved explicit node group");
            node_groups.push(Arc::new(ScaleSet::new(
                spec.name.clone(),
                spec.min_size,
                spec.max_size,
                self.inventory.clone(),
            )));
        }

        Ok(node_groups)
    }

    /// Resolves every scale set whose tags match any of the selectors.
    ///
    /// A single matching scale set with missing or invalid size tags fails the
    /// whole batch.
    #[tracing::instrument(
        name = "ScaleSetResolver::resolve_label_selectors",
        skip(self, selectors),
        fields(resource_group = %self.inventory.resource_group)
    )]
    pub async fn resolve_label_selectors(
        &self,
        selectors: &[LabelSelector],
    ) -> Result<Vec<Arc<ScaleSet>>> {
        if selectors.is_empty() {
            return Ok(vec![]);
        }

        let scale_sets = self.inventory.list_scale_sets().await?;

        let node_groups = scale_sets
            .iter()
            .filter(|s| selectors.iter().any(|selector| selector.matches(&s.tags)))
            .map(|s| {
                let (min_size, max_size) = size_bounds(s)?;

                Ok(Arc::new(ScaleSet::new(
                    s.name.clone(),
                    min_size,
                    max_size,
                    self.inventory.clone(),
                )))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            matched = node_groups.len(),
            listed = scale_sets.len(),
            "Resolved auto discovered node groups"
        );

        Ok(node_groups)
    }

    pub async fn list_instances(&self, node_group: &ScaleSet) -> Result<Vec<ScaleSetVm>> {
        self.inventory.list_scale_set_vms(node_group.id()).await
    }
}

fn size_bounds(scale_set: &VirtualMachineScaleSet) -> Result<(u64, u64)> {
    let name = &scale_set.name;

    let min: i64 = match scale_set.tags.get(MIN_SIZE_TAG) {
        Some(v) => v.parse().map_err(|source| Error::InvalidMinimumSize {
            name: name.clone(),
            source,
        })?,
        None => return Err(Error::MissingMinimumSize(name.clone())),
    };

    if min < 0 {
        return Err(Error::NegativeMinimumSize {
            name: name.clone(),
            min,
        });
    }

    let max: i64 = match scale_set.tags.get(MAX_SIZE_TAG) {
        Some(v) => v.parse().map_err(|source| Error::InvalidMaximumSize {
            name: name.clone(),
            source,
        })?,
        None => return Err(Error::MissingMaximumSize(name.clone())),
    };

    if max <= min {
        return Err(Error::MaximumNotGreaterThanMinimum {
            name: name.clone(),
            min,
            max,
        });
    }

    Ok((min as u64, max as u64))
}
