//! Node pool: membership, liveness and selection.

use crate::config::{NodePoolConfig, ResurrectPolicy, SelectionStrategy};
use crate::node::{Node, NodeState};
use crate::retry::BackoffStrategy;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of asking the pool for a node.
#[derive(Debug)]
pub enum Selection {
    /// A node to try.
    Node(NodeLease),
    /// No node can be handed out.
    Exhausted {
        /// Number of nodes currently dead.
        dead: usize,
    },
}

impl Selection {
    /// Get the lease, if a node was selected.
    pub fn into_lease(self) -> Option<NodeLease> {
        match self {
            Selection::Node(lease) => Some(lease),
            Selection::Exhausted { .. } => None,
        }
    }
}

/// A node handed out for one attempt.
///
/// While a lease is alive the node is counted as in flight, and sniffing will
/// not drop it from the pool.
#[derive(Debug)]
pub struct NodeLease {
    url: Url,
    resurrected: bool,
    inner: Arc<RwLock<PoolInner>>,
}

impl NodeLease {
    /// Endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The node was dead and is being tried again.
    pub fn is_resurrected(&self) -> bool {
        self.resurrected
    }
}

impl Drop for NodeLease {
    fn drop(&mut self) {
        let mut inner = self.inner.write();
        if let Some(pos) = inner.position(&self.url) {
            let node = &mut inner.nodes[pos];
            node.in_flight = node.in_flight.saturating_sub(1);
            if node.retired && node.in_flight == 0 {
                debug!(node = %self.url, "Removing retired node after last in-flight call");
                inner.nodes.remove(pos);
            }
        }
    }
}

/// Membership changes applied by a sniff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SniffDelta {
    /// Nodes that joined.
    pub added: usize,
    /// Nodes kept with their liveness state.
    pub retained: usize,
    /// Nodes dropped.
    pub removed: usize,
    /// Nodes kept only until their in-flight calls finish.
    pub retired: usize,
}

#[derive(Debug)]
struct PoolInner {
    nodes: Vec<Node>,
    last_sniff: Option<Instant>,
}

impl PoolInner {
    fn position(&self, url: &Url) -> Option<usize> {
        self.nodes.iter().position(|n| n.same_endpoint(url))
    }
}

/// The set of known nodes, shared by every concurrent call of a client.
///
/// All liveness transitions take the pool's write lock, so concurrent
/// attempts never observe a half-updated node.
#[derive(Debug)]
pub struct NodePool {
    inner: Arc<RwLock<PoolInner>>,
    cursor: AtomicUsize,
    sniffing: AtomicBool,
    config: NodePoolConfig,
}

impl NodePool {
    /// Create a pool from seed nodes.
    pub fn new(nodes: Vec<Node>, config: NodePoolConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(PoolInner {
                nodes,
                last_sniff: None,
            })),
            cursor: AtomicUsize::new(0),
            sniffing: AtomicBool::new(false),
            config,
        }
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &NodePoolConfig {
        &self.config
    }

    /// Select the next node to try.
    ///
    /// Dead nodes are skipped until their dead time passes. When every node is
    /// dead the resurrect policy decides between forcing the least recently
    /// failed node and reporting exhaustion.
    pub fn next(&self) -> Selection {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let candidates: Vec<usize> = inner
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_selectable(now))
            .map(|(i, _)| i)
            .collect();

        let (index, forced) = if candidates.is_empty() {
            let forced = match self.config.resurrect {
                ResurrectPolicy::FailFast => None,
                ResurrectPolicy::LeastRecentlyFailed => inner
                    .nodes
                    .iter()
                    .enumerate()
                    .filter(|(_, n)| !n.retired)
                    .min_by_key(|(_, n)| n.last_failure)
                    .map(|(i, _)| i),
            };
            match forced {
                Some(index) => (index, true),
                None => {
                    let dead = inner.nodes.iter().filter(|n| n.is_dead_at(now)).count();
                    debug!(dead, "Node pool exhausted");
                    return Selection::Exhausted { dead };
                }
            }
        } else {
            (self.pick(&inner.nodes, &candidates), false)
        };

        let node = &mut inner.nodes[index];
        node.in_flight += 1;
        let resurrected = forced || node.state == NodeState::Dead;
        if resurrected {
            debug!(node = %node.url, forced, "Resurrecting dead node");
        }

        Selection::Node(NodeLease {
            url: node.url.clone(),
            resurrected,
            inner: self.inner.clone(),
        })
    }

    fn pick(&self, nodes: &[Node], candidates: &[usize]) -> usize {
        match self.config.strategy {
            SelectionStrategy::Sticky => candidates[0],
            SelectionStrategy::RoundRobin => {
                let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
                candidates[turn % candidates.len()]
            }
            SelectionStrategy::Random => {
                let total: u64 = candidates
                    .iter()
                    .map(|&i| u64::from(nodes[i].weight.max(1)))
                    .sum();
                let mut roll = rand::rng().random_range(0..total);
                for &i in candidates {
                    let weight = u64::from(nodes[i].weight.max(1));
                    if roll < weight {
                        return i;
                    }
                    roll -= weight;
                }
                candidates[candidates.len() - 1]
            }
        }
    }

    /// Mark a node dead and schedule when it may be tried again.
    ///
    /// The dead time grows exponentially with consecutive failures, from
    /// `dead_timeout` up to `max_dead_timeout`.
    pub fn mark_dead(&self, url: &Url, reason: impl Into<String>) {
        let now = Instant::now();
        let reason = reason.into();
        let mut inner = self.inner.write();
        let Some(pos) = inner.position(url) else {
            debug!(node = %url, "Ignoring failure for a node no longer in the pool");
            return;
        };

        let node = &mut inner.nodes[pos];
        node.failed_attempts = node.failed_attempts.saturating_add(1);
        let backoff = BackoffStrategy::doubling(self.config.dead_timeout, self.config.max_dead_timeout);
        let dead_for = backoff.delay_for_attempt(node.failed_attempts - 1);
        node.state = NodeState::Dead;
        node.dead_until = Some(now + dead_for);
        node.last_failure = Some(now);
        warn!(
            node = %url,
            failed_attempts = node.failed_attempts,
            dead_for = ?dead_for,
            reason = %reason,
            "Marking node dead"
        );
        node.last_failure_reason = Some(reason);
    }

    /// Mark a node alive and reset its backoff.
    pub fn mark_alive(&self, url: &Url) {
        let mut inner = self.inner.write();
        if let Some(pos) = inner.position(url) {
            let node = &mut inner.nodes[pos];
            if node.state == NodeState::Dead {
                info!(node = %url, "Node is alive again");
            }
            node.state = NodeState::Alive;
            node.failed_attempts = 0;
            node.dead_until = None;
            node.last_seen = Some(Instant::now());
        }
    }

    /// Merge a freshly discovered node list into the pool.
    ///
    /// Nodes present on both sides keep their liveness state; vanished nodes
    /// with in-flight calls are retired instead of dropped. An empty discovery
    /// leaves the pool untouched.
    pub fn update_from_sniff(&self, discovered: Vec<Node>) -> SniffDelta {
        let mut delta = SniffDelta::default();
        if discovered.is_empty() {
            warn!("Sniffing discovered no nodes, keeping the current pool");
            return delta;
        }

        let mut inner = self.inner.write();
        let mut previous = std::mem::take(&mut inner.nodes);
        let mut next = Vec::with_capacity(discovered.len());

        for found in discovered {
            if next.iter().any(|n: &Node| n.same_endpoint(&found.url)) {
                continue;
            }
            match previous.iter().position(|n| n.same_endpoint(&found.url)) {
                Some(pos) => {
                    let mut existing = previous.swap_remove(pos);
                    existing.id = found.id.or(existing.id);
                    existing.name = found.name.or(existing.name);
                    existing.roles = found.roles;
                    existing.retired = false;
                    delta.retained += 1;
                    next.push(existing);
                }
                None => {
                    delta.added += 1;
                    next.push(found);
                }
            }
        }

        for mut gone in previous {
            if gone.in_flight > 0 {
                gone.retired = true;
                delta.retired += 1;
                next.push(gone);
            } else {
                delta.removed += 1;
            }
        }

        inner.nodes = next;
        info!(
            added = delta.added,
            retained = delta.retained,
            removed = delta.removed,
            retired = delta.retired,
            "Node pool updated from sniff"
        );
        delta
    }

    /// Copies of every node, for diagnostics.
    pub fn snapshot(&self) -> Vec<Node> {
        self.inner.read().nodes.clone()
    }

    /// Endpoints worth sniffing from, selectable nodes first.
    pub fn sniff_candidates(&self) -> Vec<Url> {
        let now = Instant::now();
        let inner = self.inner.read();
        let (mut first, rest): (Vec<&Node>, Vec<&Node>) = inner
            .nodes
            .iter()
            .filter(|n| !n.retired)
            .partition(|n| n.is_selectable(now));
        first.extend(rest);
        first.into_iter().map(|n| n.url.clone()).collect()
    }

    /// Number of nodes, retired ones included.
    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Whether the pool has no nodes at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of nodes that normal selection may hand out right now.
    pub fn alive_count(&self) -> usize {
        let now = Instant::now();
        self.inner
            .read()
            .nodes
            .iter()
            .filter(|n| n.is_selectable(now))
            .count()
    }

    /// When the pool was last refreshed by sniffing.
    pub fn last_sniff(&self) -> Option<Instant> {
        self.inner.read().last_sniff
    }

    /// Record a completed sniff.
    pub fn record_sniff(&self) {
        self.inner.write().last_sniff = Some(Instant::now());
    }

    /// Claim the right to sniff; `None` when another call is already sniffing.
    pub fn try_begin_sniff(&self) -> Option<SniffGuard<'_>> {
        self.sniffing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SniffGuard { pool: self })
    }
}

/// Held while a sniff is running.
#[derive(Debug)]
pub struct SniffGuard<'a> {
    pool: &'a NodePool,
}

impl Drop for SniffGuard<'_> {
    fn drop(&mut self) {
        self.pool.sniffing.store(false, Ordering::Release);
    }
}
