use crate::error::Result;
use crate::node_groups::{Inventory, NodeGroup};
use async_trait::async_trait;
use std::fmt;
use std::sync::{MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

pub const DEFAULT_SIZE_REFRESH_PERIOD: Duration = Duration::from_secs(15);

/// A virtual machine scale set exposed as a node group.
#[derive(Debug)]
pub struct ScaleSet {
    name: String,
    min_size: u64,
    max_size: u64,
    size_refresh_period: Duration,
    inventory: Inventory,
    cur_size: std::sync::Mutex<Option<u64>>,
    // held across the refresh, concurrent callers wait for its result
    last_refresh: Mutex<Option<Instant>>,
}

impl ScaleSet {
    pub fn new(name: String, min_size: u64, max_size: u64, inventory: Inventory) -> Self {
        Self {
            name,
            min_size,
            max_size,
            size_refresh_period: DEFAULT_SIZE_REFRESH_PERIOD,
            inventory,
            cur_size: Default::default(),
            last_refresh: Mutex::new(None),
        }
    }

    pub fn with_size_refresh_period(mut self, period: Duration) -> Self {
        self.size_refresh_period = period;
        self
    }

    pub fn size_refresh_period(&self) -> Duration {
        self.size_refresh_period
    }

    /// Last known size without contacting the inventory, `None` until the
    /// first refresh. Never waits for a refresh in flight.
    pub fn cached_size(&self) -> Option<u64> {
        *self.cur_size()
    }

    pub fn has_same_bounds(&self, other: &ScaleSet) -> bool {
        self.min_size == other.min_size && self.max_size == other.max_size
    }

    fn cur_size(&self) -> MutexGuard<'_, Option<u64>> {
        self.cur_size.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NodeGroup for ScaleSet {
    fn id(&self) -> &str {
        &self.name
    }

    fn min_size(&self) -> u64 {
        self.min_size
    }

    fn max_size(&self) -> u64 {
        self.max_size
    }

    #[tracing::instrument(name = "ScaleSet::target_size", skip(self), fields(name = %self.name))]
    async fn target_size(&self) -> Result<u64> {
        let mut last_refresh = self.last_refresh.lock().await;

        if let (Some(cur_size), Some(refreshed_at)) = (self.cached_size(), *last_refresh) {
            if refreshed_at.elapsed() < self.size_refresh_period {
                return Ok(cur_size);
            }
        }

        let scale_set = self.inventory.get_scale_set(&self.name).await?;
        let previous = self.cur_size().replace(scale_set.capacity);
        *last_refresh = Some(Instant::now());

        info!(
            ?previous,
            current = scale_set.capacity,
            "Refreshed scale set size"
        );

        Ok(scale_set.capacity)
    }
}

impl fmt::Display for ScaleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ScaleSet {} [{}..{}]",
            self.name, self.min_size, self.max_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud_provider::{MockScaleSetClient, VirtualMachineScaleSet};
    use futures::future::join_all;
    use std::sync::Arc;

    fn scale_set(client: Arc<MockScaleSetClient>) -> ScaleSet {
        ScaleSet::new(
            "test-vmss".into(),
            1,
            5,
            Inventory::new(client, "rg", Duration::from_secs(5)),
        )
    }

    fn client() -> MockScaleSetClient {
        MockScaleSetClient::new()
            .with_scale_set("rg", VirtualMachineScaleSet::new("test-vmss").capacity(3))
    }

    #[tokio::test]
    async fn size_is_fetched_lazily_and_cached() {
        let client = Arc::new(client());
        let scale_set = scale_set(client.clone());

        assert_eq!(scale_set.cached_size(), None);
        assert_eq!(client.get_scale_set_calls(), 0);

        assert_eq!(scale_set.target_size().await.unwrap(), 3);
        client.set_capacity("rg", "test-vmss", 4);
        assert_eq!(scale_set.target_size().await.unwrap(), 3);

        assert_eq!(client.get_scale_set_calls(), 1);
        assert_eq!(scale_set.cached_size(), Some(3));
    }

    #[tokio::test]
    async fn stale_size_is_refreshed() {
        let client = Arc::new(client());
        let scale_set = scale_set(client.clone()).with_size_refresh_period(Duration::from_millis(0));

        assert_eq!(scale_set.target_size().await.unwrap(), 3);
        client.set_capacity("rg", "test-vmss", 4);
        assert_eq!(scale_set.target_size().await.unwrap(), 4);
        assert_eq!(client.get_scale_set_calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_refreshes_collapse_into_one_call() {
        let client = Arc::new(client().with_latency(Duration::from_millis(50)));
        let scale_set = scale_set(client.clone());

        let sizes = join_all((0..8).map(|_| scale_set.target_size())).await;

        assert!(sizes.into_iter().all(|size| size.unwrap() == 3));
        assert_eq!(client.get_scale_set_calls(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_size_unknown() {
        let client = Arc::new(client());
        client.set_failure(Some("throttled"));
        let scale_set = scale_set(client.clone());

        assert!(scale_set.target_size().await.is_err());
        assert_eq!(scale_set.cached_size(), None);
    }

    #[tokio::test]
    async fn cached_size_does_not_wait_for_a_refresh() {
        let client = Arc::new(client().with_latency(Duration::from_millis(200)));
        let scale_set =
            Arc::new(scale_set(client).with_size_refresh_period(Duration::from_millis(0)));
        assert_eq!(scale_set.target_size().await.unwrap(), 3);

        let refreshing = {
            let scale_set = Arc::clone(&scale_set);
            tokio::spawn(async move { scale_set.target_size().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        assert_eq!(scale_set.cached_size(), Some(3));
        assert!(started.elapsed() < Duration::from_millis(100));

        assert_eq!(refreshing.await.unwrap().unwrap(), 3);
    }
}
