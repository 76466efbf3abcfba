use crate::actor;
use crate::node_groups::Manager;
use act_zero::runtimes::tokio::Timer;
use act_zero::timer::Tick;
use act_zero::{send, Actor, ActorError, ActorResult, Addr, Produces, WeakAddr};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Periodically re-runs auto discovery on the manager.
pub struct NodeGroupRefresher {
    manager: Arc<Manager>,
    interval: Duration,
    timer: Timer,
    addr: WeakAddr<Self>,
}

impl NodeGroupRefresher {
    pub fn new(manager: Arc<Manager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            timer: Default::default(),
            addr: Default::default(),
        }
    }

    #[tracing::instrument(name = "NodeGroupRefresher::refresh", skip(self))]
    async fn refresh(&mut self) -> ActorResult<()> {
        self.manager
            .force_refresh()
            .await
            .map_err(actor::Error::from)?;

        Produces::ok(())
    }
}

#[async_trait]
impl Actor for NodeGroupRefresher {
    #[tracing::instrument(
        name = "NodeGroupRefresher::started",
        skip(self, addr),
        fields(interval = ?self.interval)
    )]
    async fn started(&mut self, addr: Addr<Self>) -> ActorResult<()>
    where
        Self: Sized,
    {
        info!("Started");

        self.addr = addr.downgrade();
        self.timer
            .set_interval_weak(self.addr.clone(), self.interval);

        Produces::ok(())
    }

    async fn error(&mut self, error: ActorError) -> bool {
        actor::handle_error(error)
    }
}

#[async_trait]
impl Tick for NodeGroupRefresher {
    async fn tick(&mut self) -> ActorResult<()> {
        if self.timer.tick() {
            send!(self.addr.refresh());
        }

        Produces::ok(())
    }
}

impl Drop for NodeGroupRefresher {
    fn drop(&mut self) {
        info!("Drop {}", self);
    }
}

impl fmt::Display for NodeGroupRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeGroupRefresher ({})", self.manager)
    }
}

impl fmt::Debug for NodeGroupRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
