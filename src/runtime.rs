//! Concurrent engine: one tokio task per router.
//!
//! Each task exclusively owns its [`Router`] and talks to the others only
//! through its mailbox. The [`Switchboard`] carries envelopes between
//! mailboxes and counts messages in flight; every public operation waits for
//! that count to reach zero before returning, so callers only ever observe
//! converged tables.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::RouterId;
use crate::algorithms::{self, RouteMismatch};
use crate::config::TopologyConfig;
use crate::error::{Error, Result};
use crate::network::{DeliveryStats, Edge, EdgeKey};
use crate::protocol::{DistanceVector, Envelope, Message, RoutingTable};
use crate::router::Router;
use crate::types::Cost;

#[derive(Debug)]
enum Command {
    /// A vector from `from` is waiting in the outbox.
    Vector { from: RouterId },
    Request { from: RouterId },
    NeighborUpdate { peer: RouterId, weight: Cost },
    Broadcast,
    Snapshot(oneshot::Sender<RoutingTable>),
}

type Mailbox = mpsc::UnboundedSender<Command>;

/// Message transport shared by the router tasks.
#[derive(Debug, Default)]
struct Switchboard {
    mailboxes: RwLock<HashMap<RouterId, Mailbox>>,
    /// Latest undelivered vector per `(from, to)` link. An entry exists
    /// exactly while a `Command::Vector` for it is queued.
    outbox: Mutex<HashMap<(RouterId, RouterId), DistanceVector>>,
    in_flight: AtomicUsize,
    idle: Notify,
    budget: Option<u64>,
    spent: AtomicU64,
    exhausted: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
    requests: AtomicU64,
    coalesced: AtomicU64,
}

impl Switchboard {
    fn new(budget: Option<u64>) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    /// Queues a counted command. Returns false if the recipient is gone.
    async fn post(&self, to: &str, command: Command) -> bool {
        let mailboxes = self.mailboxes.read().await;
        let Some(mailbox) = mailboxes.get(to) else {
            return false;
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if mailbox.send(command).is_err() {
            self.complete();
            return false;
        }
        true
    }

    async fn dispatch(&self, outbound: Vec<Envelope>) {
        for Envelope { from, to, message } in outbound {
            let delivered = match message {
                Message::Vector(vector) => {
                    let link = (from.clone(), to.clone());
                    let mut outbox = self.outbox.lock().await;
                    if let Some(queued) = outbox.get_mut(&link) {
                        *queued = vector;
                        self.coalesced.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    outbox.insert(link.clone(), vector);
                    drop(outbox);

                    let posted = self.post(&to, Command::Vector { from }).await;
                    if !posted {
                        self.outbox.lock().await.remove(&link);
                    }
                    posted
                }
                Message::Request => self.post(&to, Command::Request { from }).await,
            };

            if !delivered {
                debug!(to = %to, "dropping message to removed node");
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Counts one delivery against the budget. False once it is used up.
    fn charge(&self) -> bool {
        let spent = self.spent.fetch_add(1, Ordering::SeqCst) + 1;
        match self.budget {
            Some(limit) if spent > limit => {
                self.exhausted.store(true, Ordering::SeqCst);
                false
            }
            _ => true,
        }
    }

    /// Marks one counted command as fully handled.
    fn complete(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn quiescent(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Waits for quiescence, then closes the budget for this cascade.
    async fn settle(&self) -> Result<()> {
        self.quiescent().await;
        self.spent.store(0, Ordering::SeqCst);
        if self.exhausted.swap(false, Ordering::SeqCst) {
            let limit = self.budget.unwrap_or_default();
            warn!(limit, "cascade stopped before converging");
            return Err(Error::NotConverged { limit });
        }
        Ok(())
    }

    fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

async fn router_task(mut router: Router, mut inbox: mpsc::UnboundedReceiver<Command>, switchboard: Arc<Switchboard>) -> Router {
    debug!(router = router.id(), "router task started");

    while let Some(command) = inbox.recv().await {
        let outbound = match command {
            Command::Snapshot(reply) => {
                let _ = reply.send(router.snapshot());
                continue;
            }
            Command::NeighborUpdate { peer, weight } => router.neighbor_update(&peer, weight),
            Command::Broadcast => router.broadcast(),
            Command::Vector { from } => {
                let link = (from, router.id().to_string());
                let vector = switchboard.outbox.lock().await.remove(&link);
                match vector {
                    Some(vector) if switchboard.charge() => {
                        switchboard.delivered.fetch_add(1, Ordering::Relaxed);
                        router.receive(&link.0, &vector)
                    }
                    _ => Vec::new(),
                }
            }
            Command::Request { from } => {
                if switchboard.charge() {
                    switchboard.delivered.fetch_add(1, Ordering::Relaxed);
                    switchboard.requests.fetch_add(1, Ordering::Relaxed);
                    router.respond(&from)
                } else {
                    Vec::new()
                }
            }
        };

        switchboard.dispatch(outbound).await;
        switchboard.complete();
    }

    debug!(router = router.id(), "router task stopped");
    router
}

/// Concurrent counterpart of [`crate::Topology`].
///
/// Must be used from within a tokio runtime.
pub struct AsyncTopology {
    config: TopologyConfig,
    switchboard: Arc<Switchboard>,
    tasks: HashMap<RouterId, JoinHandle<Router>>,
    edges: BTreeMap<EdgeKey, u64>,
}

impl Default for AsyncTopology {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncTopology {
    pub fn new() -> Self {
        Self::with_config(TopologyConfig::default())
    }

    pub fn with_config(config: TopologyConfig) -> Self {
        Self {
            config,
            switchboard: Arc::new(Switchboard::new(config.message_budget)),
            tasks: HashMap::new(),
            edges: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub async fn add_node(&mut self, id: impl Into<RouterId>) -> Result<()> {
        let id = id.into();
        if self.tasks.contains_key(&id) {
            warn!(node = %id, "rejecting duplicate node");
            return Err(Error::DuplicateNode(id));
        }

        info!(node = %id, "spawning router task");
        let (tx, rx) = mpsc::unbounded_channel();
        self.switchboard.mailboxes.write().await.insert(id.clone(), tx);

        let router = Router::new(id.clone(), self.config.infinity);
        let handle = tokio::spawn(router_task(router, rx, self.switchboard.clone()));
        self.tasks.insert(id, handle);
        Ok(())
    }

    /// Creates or re-weights `a`-`b`, returning once every router has converged.
    pub async fn add_edge(&mut self, a: &str, b: &str, weight: u64) -> Result<()> {
        self.ensure_node(a)?;
        self.ensure_node(b)?;
        if a == b {
            return Err(Error::SelfLoop(a.to_string()));
        }
        if weight >= self.config.infinity {
            return Err(Error::InvalidWeight { weight, limit: self.config.infinity });
        }

        let key = EdgeKey::new(a, b);
        info!(edge = %key, weight, "setting edge");

        // each mailbox is FIFO, so both routers see the new link before either broadcast
        for (node, peer) in [(a, b), (b, a)] {
            self.command(node, Command::NeighborUpdate { peer: peer.to_string(), weight: Cost::Finite(weight) }).await?;
        }
        for node in [a, b] {
            self.command(node, Command::Broadcast).await?;
        }
        self.edges.insert(key, weight);

        self.switchboard.settle().await
    }

    pub async fn remove_edge(&mut self, a: &str, b: &str) -> Result<()> {
        self.ensure_node(a)?;
        self.ensure_node(b)?;

        let key = EdgeKey::new(a, b);
        if self.detach(&key).await? {
            self.switchboard.settle().await?;
        }
        Ok(())
    }

    /// Stops the router's task, then removes each incident edge.
    pub async fn remove_node(&mut self, id: &str) -> Result<()> {
        self.ensure_node(id)?;

        info!(node = %id, "removing node");
        self.switchboard.mailboxes.write().await.remove(id);
        if let Some(handle) = self.tasks.remove(id) {
            // the mailbox sender is gone, so the task drains and exits
            if let Err(e) = handle.await {
                warn!(node = %id, error = %e, "router task ended abnormally");
            }
        }

        let incident: Vec<EdgeKey> = self.edges.keys().filter(|key| key.touches(id)).cloned().collect();
        for key in incident {
            self.edges.remove(&key);
            if let Some(peer) = key.other(id) {
                debug!(edge = %key, "removing edge with removed node");
                self.command(peer, Command::NeighborUpdate { peer: id.to_string(), weight: Cost::Infinite }).await?;
            }
            self.switchboard.settle().await?;
        }
        Ok(())
    }

    /// Snapshot of every routing table, requested from each task.
    pub async fn tables(&self) -> Result<BTreeMap<RouterId, RoutingTable>> {
        let mut tables = BTreeMap::new();
        for id in self.tasks.keys() {
            let (reply, response) = oneshot::channel();
            self.send_uncounted(id, Command::Snapshot(reply)).await?;
            let table = response.await.map_err(|_| Error::EngineStopped)?;
            tables.insert(id.clone(), table);
        }
        Ok(tables)
    }

    pub fn node_ids(&self) -> Vec<RouterId> {
        let mut ids: Vec<RouterId> = self.tasks.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.edges
            .iter()
            .map(|(key, weight)| {
                let (a, b) = key.endpoints();
                Edge { a: a.to_string(), b: b.to_string(), weight: *weight }
            })
            .collect()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.switchboard.stats()
    }

    pub async fn mismatches(&self) -> Result<Vec<RouteMismatch>> {
        let tables = self.tables().await?;
        Ok(algorithms::compare(&tables, &self.edges, self.config.infinity))
    }

    /// Closes every mailbox and waits for the router tasks to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        self.switchboard.quiescent().await;
        self.switchboard.mailboxes.write().await.clear();

        for (id, handle) in self.tasks.drain() {
            if let Err(e) = handle.await {
                warn!(node = %id, error = %e, "router task ended abnormally");
                return Err(Error::EngineStopped);
            }
        }
        info!("routing engine stopped");
        Ok(())
    }

    fn ensure_node(&self, id: &str) -> Result<()> {
        if self.tasks.contains_key(id) {
            Ok(())
        } else {
            warn!(node = %id, "unknown node");
            Err(Error::UnknownNode(id.to_string()))
        }
    }

    async fn detach(&mut self, key: &EdgeKey) -> Result<bool> {
        if self.edges.remove(key).is_none() {
            debug!(edge = %key, "no edge to remove");
            return Ok(false);
        }

        info!(edge = %key, "removing edge");
        let (a, b) = key.endpoints();
        for (node, peer) in [(a, b), (b, a)] {
            if self.tasks.contains_key(node) {
                self.command(node, Command::NeighborUpdate { peer: peer.to_string(), weight: Cost::Infinite }).await?;
            }
        }
        Ok(true)
    }

    async fn command(&self, id: &str, command: Command) -> Result<()> {
        if self.switchboard.post(id, command).await {
            Ok(())
        } else {
            Err(Error::EngineStopped)
        }
    }

    async fn send_uncounted(&self, id: &str, command: Command) -> Result<()> {
        let mailboxes = self.switchboard.mailboxes.read().await;
        let mailbox = mailboxes.get(id).ok_or(Error::EngineStopped)?;
        mailbox.send(command).map_err(|_| Error::EngineStopped)
    }
}

impl Drop for AsyncTopology {
    fn drop(&mut self) {
        // tasks hold the switchboard, so its senders must be dropped for them to exit
        if let Ok(mut mailboxes) = self.switchboard.mailboxes.try_write() {
            mailboxes.clear();
        }
    }
}
