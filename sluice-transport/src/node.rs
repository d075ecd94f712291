//! Cluster nodes as seen by the client.

use std::time::Instant;
use url::Url;

/// Liveness state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Never contacted yet (seed or freshly sniffed).
    Unknown,
    /// Last call succeeded.
    Alive,
    /// Last call failed; not selected until `dead_until` passes.
    Dead,
}

/// Roles a node advertises in the cluster topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRoles {
    /// Holds data.
    pub data: bool,
    /// Can be elected master.
    pub master_eligible: bool,
    /// Runs ingest pipelines.
    pub ingest: bool,
}

impl Default for NodeRoles {
    fn default() -> Self {
        Self::all()
    }
}

impl NodeRoles {
    /// A node with every role. Seeds are assumed to be this until sniffed.
    pub fn all() -> Self {
        Self {
            data: true,
            master_eligible: true,
            ingest: true,
        }
    }

    /// Build roles from the names reported by the nodes info API.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roles = Self {
            data: false,
            master_eligible: false,
            ingest: false,
        };
        for name in names {
            match name.as_ref() {
                "master" => roles.master_eligible = true,
                "ingest" => roles.ingest = true,
                role if role == "data" || role.starts_with("data_") => roles.data = true,
                _ => {}
            }
        }
        roles
    }

    /// Master-eligible without data or ingest; requests should avoid these.
    pub fn is_master_only(&self) -> bool {
        self.master_eligible && !self.data && !self.ingest
    }
}

/// One endpoint the client may route requests to.
///
/// Owned by the [`NodePool`](crate::NodePool); values handed out by the pool
/// are copies for inspection.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) url: Url,
    pub(crate) id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) roles: NodeRoles,
    pub(crate) weight: u32,
    pub(crate) state: NodeState,
    pub(crate) failed_attempts: u32,
    pub(crate) dead_until: Option<Instant>,
    pub(crate) last_seen: Option<Instant>,
    pub(crate) last_failure: Option<Instant>,
    pub(crate) last_failure_reason: Option<String>,
    pub(crate) in_flight: usize,
    pub(crate) retired: bool,
}

impl Node {
    /// Create a node in the `Unknown` state.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            id: None,
            name: None,
            roles: NodeRoles::all(),
            weight: 1,
            state: NodeState::Unknown,
            failed_attempts: 0,
            dead_until: None,
            last_seen: None,
            last_failure: None,
            last_failure_reason: None,
            in_flight: 0,
            retired: false,
        }
    }

    /// Parse a node from a URL string.
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Set the node id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the node name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the node roles.
    pub fn with_roles(mut self, roles: NodeRoles) -> Self {
        self.roles = roles;
        self
    }

    /// Set the selection weight used by random selection.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Node id reported by the cluster.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Node name reported by the cluster.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Advertised roles.
    pub fn roles(&self) -> NodeRoles {
        self.roles
    }

    /// Selection weight.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Liveness state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Consecutive failures since the node was last marked alive.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// When a dead node becomes eligible for resurrection.
    pub fn dead_until(&self) -> Option<Instant> {
        self.dead_until
    }

    /// Last successful contact.
    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    /// Last failure time.
    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    /// Last failure reason.
    pub fn last_failure_reason(&self) -> Option<&str> {
        self.last_failure_reason.as_deref()
    }

    /// Number of calls currently using this node.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Whether sniffing removed the node while calls were still using it.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Dead and still inside its backoff window at `now`.
    pub fn is_dead_at(&self, now: Instant) -> bool {
        self.state == NodeState::Dead && self.dead_until.is_none_or(|until| until > now)
    }

    /// May be handed out by normal selection at `now`.
    pub(crate) fn is_selectable(&self, now: Instant) -> bool {
        !self.retired && !self.is_dead_at(now)
    }

    pub(crate) fn same_endpoint(&self, other: &Url) -> bool {
        same_endpoint(&self.url, other)
    }
}

/// Compare two endpoints ignoring a trailing slash.
pub(crate) fn same_endpoint(a: &Url, b: &Url) -> bool {
    a.as_str().trim_end_matches('/') == b.as_str().trim_end_matches('/')
}
