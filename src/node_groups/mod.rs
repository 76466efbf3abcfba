mod discovery;
mod manager;
mod refresher;
pub mod registry;
mod scale_set;
pub mod spec;

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

pub use discovery::{Inventory, ScaleSetResolver, MAX_SIZE_TAG, MIN_SIZE_TAG};
pub use manager::Manager;
pub use refresher::NodeGroupRefresher;
pub use registry::{Registry, Snapshot};
pub use scale_set::{ScaleSet, DEFAULT_SIZE_REFRESH_PERIOD};
pub use spec::{DiscoverySpec, ExplicitSpec, LabelSelector};

/// The view of a scalable group the autoscaling control loop works with.
#[async_trait]
pub trait NodeGroup: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn min_size(&self) -> u64;
    fn max_size(&self) -> u64;
    /// Current size, refreshed from the inventory once the cached value is stale.
    async fn target_size(&self) -> Result<u64>;
}
