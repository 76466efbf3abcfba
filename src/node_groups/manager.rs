use crate::cloud_provider::{self, ScaleSetClient};
use crate::config::VM_TYPE_VMSS;
use crate::error::{Error, Result};
use crate::node_groups::registry::{self, Registry};
use crate::node_groups::spec::{self, DiscoverySpec, ExplicitSpec, LabelSelector};
use crate::node_groups::{Inventory, NodeGroup, ScaleSet, ScaleSetResolver};
use crate::AppConfig;
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{info, warn};

/// Owns the discovery specs and the node group registry.
///
/// Discovery cycles run one at a time; a failed cycle leaves the previous
/// registry snapshot in place.
pub struct Manager {
    config: AppConfig,
    resolver: ScaleSetResolver,
    registry: Registry,
    specs: Vec<DiscoverySpec>,
    explicitly_configured: Mutex<HashSet<String>>,
    last_refresh: Mutex<Option<Instant>>,
    cycle: tokio::sync::Mutex<()>,
}

impl Manager {
    pub fn new(config: AppConfig, client: Arc<dyn ScaleSetClient>) -> Result<Self> {
        if !config.vm_type.eq_ignore_ascii_case(VM_TYPE_VMSS) {
            return Err(Error::UnsupportedVmType(config.vm_type.clone()));
        }

        let specs =
            spec::parse_discovery_specs(&config.node_groups, &config.node_group_auto_discovery)?;
        let inventory = Inventory::new(
            client,
            config.resource_group.clone(),
            config.inventory_timeout,
        );

        Ok(Self {
            resolver: ScaleSetResolver::new(inventory),
            registry: Registry::new(),
            specs,
            explicitly_configured: Default::default(),
            last_refresh: Default::default(),
            cycle: Default::default(),
            config,
        })
    }

    /// Builds a manager and runs the initial explicit and auto discovery.
    pub async fn create(config: AppConfig, client: Arc<dyn ScaleSetClient>) -> Result<Arc<Self>> {
        let manager = Self::new(config, client)?;

        let explicit: Vec<ExplicitSpec> = manager.explicit_specs().cloned().collect();
        manager.register_explicit(&explicit).await?;
        manager.force_refresh().await?;

        Ok(Arc::new(manager))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn get_asgs(&self) -> Vec<Arc<ScaleSet>> {
        self.registry.get()
    }

    pub fn find_for_instance(&self, instance_id: &str) -> Option<Arc<ScaleSet>> {
        self.registry.find_for_instance(instance_id)
    }

    pub fn explicit_specs(&self) -> impl Iterator<Item = &ExplicitSpec> {
        self.specs.iter().filter_map(|spec| match spec {
            DiscoverySpec::Explicit(v) => Some(v),
            DiscoverySpec::LabelSelector(_) => None,
        })
    }

    pub fn auto_discovery_specs(&self) -> Vec<LabelSelector> {
        self.specs
            .iter()
            .filter_map(|spec| match spec {
                DiscoverySpec::Explicit(_) => None,
                DiscoverySpec::LabelSelector(v) => Some(v.clone()),
            })
            .collect()
    }

    /// Parses and registers explicit node group specs on top of the current
    /// registry content.
    pub async fn fetch_explicit_asgs<S: AsRef<str>>(&self, specs: &[S]) -> Result<()> {
        let specs = specs
            .iter()
            .map(|spec| spec::parse_explicit(spec.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        self.register_explicit(&specs).await
    }

    #[tracing::instrument(name = "Manager::register_explicit", skip(self, specs))]
    async fn register_explicit(&self, specs: &[ExplicitSpec]) -> Result<()> {
        let _cycle = self.cycle.lock().await;

        let node_groups = self.resolver.resolve_explicit(specs).await?;
        let mut staged = self.registry.snapshot().node_groups().to_vec();
        let mut names = Vec::with_capacity(node_groups.len());
        let mut changed = false;

        for node_group in node_groups {
            names.push(node_group.id().to_ascii_lowercase());
            changed |= registry::register(&mut staged, node_group);
        }

        self.commit(staged, changed).await?;
        self.explicitly_configured().extend(names);

        Ok(())
    }

    /// Re-resolves the auto discovery specs and makes the registry reflect
    /// exactly the scale sets that currently match, next to the explicitly
    /// configured ones.
    #[tracing::instrument(name = "Manager::fetch_auto_asgs", skip(self))]
    pub async fn fetch_auto_asgs(&self) -> Result<()> {
        let _cycle = self.cycle.lock().await;

        let node_groups = self
            .get_filtered_autoscaling_groups(&self.auto_discovery_specs())
            .await?;
        let explicit = self.explicitly_configured().clone();
        let mut staged = self.registry.snapshot().node_groups().to_vec();
        let mut matching = HashSet::with_capacity(node_groups.len());
        let mut changed = false;

        for node_group in node_groups {
            let name = node_group.id().to_ascii_lowercase();
            matching.insert(name.clone());

            // explicit specs take precedence over auto discovery
            if explicit.contains(&name) {
                continue;
            }

            changed |= registry::register(&mut staged, node_group);
        }

        let before = staged.len();
        staged.retain(|g| {
            let name = g.id().to_ascii_lowercase();
            matching.contains(&name) || explicit.contains(&name)
        });

        if staged.len() != before {
            info!(evicted = before - staged.len(), "Evicted stale node groups");
            changed = true;
        }

        self.commit(staged, changed).await?;

        Ok(())
    }

    /// Resolves `selectors` against the inventory without touching the registry.
    pub async fn get_filtered_autoscaling_groups(
        &self,
        selectors: &[LabelSelector],
    ) -> Result<Vec<Arc<ScaleSet>>> {
        self.resolver.resolve_label_selectors(selectors).await
    }

    /// Runs auto discovery if the refresh interval has passed.
    pub async fn refresh(&self) -> Result<()> {
        let due = match *self.last_refresh() {
            Some(last_refresh) => last_refresh.elapsed() >= self.config.refresh_interval,
            None => true,
        };

        if !due {
            return Ok(());
        }

        self.force_refresh().await
    }

    pub async fn force_refresh(&self) -> Result<()> {
        self.fetch_auto_asgs().await?;
        *self.last_refresh() = Some(Instant::now());

        info!(
            next_refresh_in = ?self.config.refresh_interval,
            node_groups = self.registry.snapshot().len(),
            "Refreshed node group list"
        );

        Ok(())
    }

    /// Re-indexes the member instances of `node_groups` and installs a new
    /// snapshot if the node groups or their instances changed.
    async fn commit(&self, node_groups: Vec<Arc<ScaleSet>>, changed: bool) -> Result<()> {
        let instances = self.index_instances(&node_groups).await?;

        if !changed && self.registry.snapshot().instances() == &instances {
            return Ok(());
        }

        let version = self.registry.replace(node_groups, instances);

        info!(version, "Installed node group snapshot");

        Ok(())
    }

    async fn index_instances(
        &self,
        node_groups: &[Arc<ScaleSet>],
    ) -> Result<HashMap<String, String>> {
        let listings = try_join_all(node_groups.iter().map(|node_group| async move {
            match self.resolver.list_instances(node_group).await {
                Ok(vms) => Ok((node_group.id(), vms)),
                Err(Error::InventoryQueryFailed {
                    source: cloud_provider::Error::ScaleSetNotFound { .. },
                    ..
                }) => {
                    warn!(name = node_group.id(), "Scale set vanished, not indexing its instances");
                    Ok((node_group.id(), vec![]))
                }
                Err(e) => Err(e),
            }
        }))
        .await?;

        let mut instances = HashMap::new();
        for (name, vms) in listings {
            for vm in vms {
                instances.insert(vm.id.to_ascii_lowercase(), name.to_owned());
            }
        }

        Ok(instances)
    }

    fn explicitly_configured(&self) -> MutexGuard<'_, HashSet<String>> {
        self.explicitly_configured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn last_refresh(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Manager ({})", self.config.resource_group)
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
