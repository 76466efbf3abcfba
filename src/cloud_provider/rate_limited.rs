use crate::cloud_provider::{Result, ScaleSetClient, ScaleSetVm, VirtualMachineScaleSet};
use crate::rate_limit::{CloudProviderRateLimitConfig, RateLimiter, ResourceCategory};
use async_trait::async_trait;
use std::sync::Arc;

/// Puts a token bucket in front of every inventory call.
///
/// Scale set reads draw from the scale set bucket, member listings from the
/// virtual machine bucket.
#[derive(Debug)]
pub struct RateLimitedClient {
    inner: Arc<dyn ScaleSetClient>,
    scale_sets: RateLimiter,
    virtual_machines: RateLimiter,
}

impl RateLimitedClient {
    pub fn new(inner: Arc<dyn ScaleSetClient>, config: &CloudProviderRateLimitConfig) -> Self {
        let limiter = |category| RateLimiter::new(category, config.for_category(category));

        Self {
            inner,
            scale_sets: limiter(ResourceCategory::VirtualMachineScaleSet),
            virtual_machines: limiter(ResourceCategory::VirtualMachine),
        }
    }
}

#[async_trait]
impl ScaleSetClient for RateLimitedClient {
    #[tracing::instrument(name = "RateLimitedClient::list_scale_sets", skip(self))]
    async fn list_scale_sets(&self, resource_group: &str) -> Result<Vec<VirtualMachineScaleSet>> {
        self.scale_sets.acquire_read().await;
        self.inner.list_scale_sets(resource_group).await
    }

    #[tracing::instrument(name = "RateLimitedClient::get_scale_set", skip(self))]
    async fn get_scale_set(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<VirtualMachineScaleSet> {
        self.scale_sets.acquire_read().await;
        self.inner.get_scale_set(resource_group, name).await
    }

    #[tracing::instrument(name = "RateLimitedClient::list_scale_set_vms", skip(self))]
    async fn list_scale_set_vms(
        &self,
        resource_group: &str,
        scale_set: &str,
    ) -> Result<Vec<ScaleSetVm>> {
        self.virtual_machines.acquire_read().await;
        self.inner.list_scale_set_vms(resource_group, scale_set).await
    }
}
