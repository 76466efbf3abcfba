use crate::cloud_provider::{Error, Result, ScaleSetClient, ScaleSetVm, VirtualMachineScaleSet};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
struct Inventory {
    scale_sets: HashMap<String, Vec<VirtualMachineScaleSet>>,
    vms: HashMap<(String, String), Vec<ScaleSetVm>>,
}

/// In-memory inventory with call counters, optional latency and failure injection.
#[derive(Debug, Default)]
pub struct MockScaleSetClient {
    inventory: Mutex<Inventory>,
    failure: Mutex<Option<String>>,
    latency: Option<Duration>,
    list_scale_sets_calls: AtomicUsize,
    get_scale_set_calls: AtomicUsize,
    list_scale_set_vms_calls: AtomicUsize,
}

impl MockScaleSetClient {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_scale_set(self, resource_group: &str, scale_set: VirtualMachineScaleSet) -> Self {
        self.inventory()
            .scale_sets
            .entry(resource_group.into())
            .or_default()
            .push(scale_set);
        self
    }

    pub fn with_vms(self, resource_group: &str, scale_set: &str, vms: Vec<ScaleSetVm>) -> Self {
        self.inventory()
            .vms
            .insert((resource_group.into(), scale_set.into()), vms);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_scale_sets(&self, resource_group: &str, scale_sets: Vec<VirtualMachineScaleSet>) {
        self.inventory()
            .scale_sets
            .insert(resource_group.into(), scale_sets);
    }

    pub fn set_vms(&self, resource_group: &str, scale_set: &str, vms: Vec<ScaleSetVm>) {
        self.inventory()
            .vms
            .insert((resource_group.into(), scale_set.into()), vms);
    }

    pub fn set_capacity(&self, resource_group: &str, name: &str, capacity: u64) {
        if let Some(scale_sets) = self.inventory().scale_sets.get_mut(resource_group) {
            scale_sets
                .iter_mut()
                .filter(|s| s.name == name)
                .for_each(|s| s.capacity = capacity);
        }
    }

    pub fn set_failure(&self, reason: Option<&str>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = reason.map(String::from);
    }

    pub fn list_scale_sets_calls(&self) -> usize {
        self.list_scale_sets_calls.load(Ordering::SeqCst)
    }

    pub fn get_scale_set_calls(&self) -> usize {
        self.get_scale_set_calls.load(Ordering::SeqCst)
    }

    pub fn list_scale_set_vms_calls(&self) -> usize {
        self.list_scale_set_vms_calls.load(Ordering::SeqCst)
    }

    fn inventory(&self) -> MutexGuard<'_, Inventory> {
        self.inventory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match failure {
            Some(reason) => Err(Error::Unavailable(reason)),
            None => Ok(()),
        }
    }

    fn find(&self, resource_group: &str, name: &str) -> Result<VirtualMachineScaleSet> {
        self.inventory()
            .scale_sets
            .get(resource_group)
            .and_then(|scale_sets| scale_sets.iter().find(|s| s.name == name))
            .cloned()
            .ok_or_else(|| Error::ScaleSetNotFound {
                resource_group: resource_group.into(),
                name: name.into(),
            })
    }
}

#[async_trait]
impl ScaleSetClient for MockScaleSetClient {
    async fn list_scale_sets(&self, resource_group: &str) -> Result<Vec<VirtualMachineScaleSet>> {
        self.list_scale_sets_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        let scale_sets = self
            .inventory()
            .scale_sets
            .get(resource_group)
            .cloned()
            .unwrap_or_default();

        debug!(resource_group, count = scale_sets.len(), "Listed mock scale sets");

        Ok(scale_sets)
    }

    async fn get_scale_set(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<VirtualMachineScaleSet> {
        self.get_scale_set_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        self.find(resource_group, name)
    }

    async fn list_scale_set_vms(
        &self,
        resource_group: &str,
        scale_set: &str,
    ) -> Result<Vec<ScaleSetVm>> {
        self.list_scale_set_vms_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        self.find(resource_group, scale_set)?;

        Ok(self
            .inventory()
            .vms
            .get(&(resource_group.to_owned(), scale_set.to_owned()))
            .cloned()
            .unwrap_or_default())
    }
}
