// In-memory cluster implementing the transport connection seam

use crate::behavior::Behavior;
use crate::bulk::{BulkRequestItem, ItemReply, ItemRule, parse_bulk_body, render_bulk_response};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use parking_lot::Mutex;
use serde_json::{Value, json};
use sluice_transport::{
    Connection, ConnectionError, RawResponse, RequestPipeline, RequestSpec, TransportConfig,
    TransportError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A call received by the virtual cluster.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Node the call was sent to.
    pub node: Url,
    /// HTTP method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Bytes>,
}

impl RecordedCall {
    /// Whether the call was a bulk request.
    pub fn is_bulk(&self) -> bool {
        self.path.ends_with("/_bulk")
    }

    /// Body as text.
    pub fn body_text(&self) -> String {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    /// Bulk items carried by the call; empty for non-bulk calls.
    pub fn bulk_items(&self) -> Vec<BulkRequestItem> {
        match &self.body {
            Some(body) if self.is_bulk() => parse_bulk_body(body, None).unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

/// Overrides the scripted behaviour for matching calls.
pub type Route = Arc<dyn Fn(&RecordedCall) -> Option<Behavior> + Send + Sync>;

struct VirtualNode {
    url: Url,
    behavior: Behavior,
    calls: usize,
}

struct ClusterState {
    nodes: Vec<VirtualNode>,
    topology: Vec<Url>,
    routes: Vec<Route>,
    item_rule: ItemRule,
    deliveries: HashMap<String, usize>,
    calls: Vec<RecordedCall>,
}

/// Scripted in-memory cluster.
///
/// Each virtual node answers according to its [`Behavior`]. Bulk bodies are
/// answered item by item through an [`ItemRule`], and the nodes info path
/// reports the current topology so sniffing can be exercised.
#[derive(Clone)]
pub struct VirtualCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl VirtualCluster {
    /// Create a cluster of `count` healthy nodes named `node-0`, `node-1`, ...
    pub fn new(count: usize) -> Self {
        let urls: Vec<Url> = (0..count).filter_map(|i| node_url(i).ok()).collect();
        let nodes = urls
            .iter()
            .map(|url| VirtualNode {
                url: url.clone(),
                behavior: Behavior::Ok,
                calls: 0,
            })
            .collect();

        Self {
            state: Arc::new(Mutex::new(ClusterState {
                nodes,
                topology: urls,
                routes: Vec::new(),
                item_rule: Arc::new(|_| ItemReply::Ok),
                deliveries: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// Set the behaviour of node `index`.
    pub fn with_behavior(self, index: usize, behavior: Behavior) -> Self {
        self.set_behavior(index, behavior);
        self
    }

    /// Set the behaviour of every node.
    pub fn with_all(self, behavior: Behavior) -> Self {
        for node in self.state.lock().nodes.iter_mut() {
            node.behavior = behavior.clone();
        }
        self
    }

    /// Set the bulk item rule.
    pub fn with_item_rule(self, rule: ItemRule) -> Self {
        self.state.lock().item_rule = rule;
        self
    }

    /// Add a route consulted before node behaviours; the first match wins.
    pub fn with_route<F>(self, route: F) -> Self
    where
        F: Fn(&RecordedCall) -> Option<Behavior> + Send + Sync + 'static,
    {
        self.state.lock().routes.push(Arc::new(route));
        self
    }

    /// Change the behaviour of node `index` while the cluster is in use.
    pub fn set_behavior(&self, index: usize, behavior: Behavior) {
        if let Some(node) = self.state.lock().nodes.get_mut(index) {
            node.behavior = behavior;
            node.calls = 0;
        }
    }

    /// Replace the topology reported to sniffing. Unknown URLs become new
    /// healthy nodes.
    pub fn set_topology<I, S>(&self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        let topology: Vec<Url> = urls
            .into_iter()
            .filter_map(|u| Url::parse(u.as_ref()).ok())
            .collect();
        for url in &topology {
            if !state.nodes.iter().any(|n| same(&n.url, url)) {
                state.nodes.push(VirtualNode {
                    url: url.clone(),
                    behavior: Behavior::Ok,
                    calls: 0,
                });
            }
        }
        state.topology = topology;
    }

    /// URLs of the nodes, for transport configuration.
    pub fn urls(&self) -> Vec<String> {
        self.state
            .lock()
            .nodes
            .iter()
            .map(|n| n.url.as_str().trim_end_matches('/').to_string())
            .collect()
    }

    /// A transport configuration seeded with every node.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::cluster(self.urls())
    }

    /// A pipeline over this cluster.
    pub fn pipeline(&self, config: TransportConfig) -> Result<RequestPipeline, TransportError> {
        RequestPipeline::new(config, self.clone())
    }

    /// Every call received, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Calls received by node `index`.
    pub fn calls_to(&self, index: usize) -> Vec<RecordedCall> {
        let state = self.state.lock();
        let Some(node) = state.nodes.get(index) else {
            return Vec::new();
        };
        state
            .calls
            .iter()
            .filter(|c| same(&c.node, &node.url))
            .cloned()
            .collect()
    }

    /// Bulk calls received.
    pub fn bulk_calls(&self) -> Vec<RecordedCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.is_bulk())
            .cloned()
            .collect()
    }

    /// How many times the item with this key (usually its id) was delivered.
    pub fn deliveries(&self, key: &str) -> usize {
        self.state.lock().deliveries.get(key).copied().unwrap_or(0)
    }

    /// Forget recorded calls and deliveries.
    pub fn clear_calls(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.deliveries.clear();
    }

    fn answer_ok(&self, call: &RecordedCall) -> RawResponse {
        if call.is_bulk() {
            return self.answer_bulk(call);
        }
        if call.path.starts_with("/_nodes") {
            let state = self.state.lock();
            return RawResponse::json(&nodes_info(&state.topology));
        }
        RawResponse::json(&json!({}))
    }

    fn answer_bulk(&self, call: &RecordedCall) -> RawResponse {
        let default_index = call
            .path
            .strip_suffix("/_bulk")
            .map(|p| p.trim_start_matches('/'))
            .filter(|p| !p.is_empty());
        let items = match call.body.as_deref().map(|b| parse_bulk_body(b, default_index)) {
            Some(Ok(items)) => items,
            Some(Err(reason)) => return error_response(400, "illegal_argument_exception", &reason),
            None => return error_response(400, "action_request_validation_exception", "request body is required"),
        };

        let mut state = self.state.lock();
        let rule = state.item_rule.clone();
        let replies: Vec<(BulkRequestItem, ItemReply)> = items
            .into_iter()
            .map(|mut item| {
                let seen = state.deliveries.entry(item.key()).or_insert(0);
                *seen += 1;
                item.seen = *seen;
                let reply = rule(&item);
                (item, reply)
            })
            .collect();
        RawResponse::json(&render_bulk_response(&replies))
    }
}

#[async_trait]
impl Connection for VirtualCluster {
    async fn send(
        &self,
        node: &Url,
        request: &RequestSpec,
        timeout: Duration,
    ) -> Result<RawResponse, ConnectionError> {
        let call = RecordedCall {
            node: node.clone(),
            method: request.method().clone(),
            path: request.path().to_string(),
            query: request.query_pairs().to_vec(),
            body: request.body_bytes().cloned(),
        };

        let behavior = {
            let mut state = self.state.lock();
            state.calls.push(call.clone());
            let routed = state.routes.iter().find_map(|route| route(&call));
            match state.nodes.iter_mut().find(|n| same(&n.url, node)) {
                Some(virtual_node) => {
                    let n = virtual_node.calls;
                    virtual_node.calls += 1;
                    routed.unwrap_or_else(|| virtual_node.behavior.resolve(n).clone())
                }
                None => routed.unwrap_or(Behavior::Refuse),
            }
        };

        self.perform(behavior, &call, timeout).await
    }
}

impl VirtualCluster {
    async fn perform(
        &self,
        mut behavior: Behavior,
        call: &RecordedCall,
        timeout: Duration,
    ) -> Result<RawResponse, ConnectionError> {
        loop {
            behavior = match behavior {
                Behavior::Ok => return Ok(self.answer_ok(call)),
                Behavior::Status(status) => {
                    return Ok(error_response(status, "virtual_cluster_exception", "scripted failure"));
                }
                Behavior::Body(status, body) => {
                    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                    return Ok(RawResponse::new(status, body));
                }
                Behavior::Refuse => {
                    return Err(ConnectionError::Connect(format!("connection refused: {}", call.node)));
                }
                Behavior::Timeout => return Err(ConnectionError::Timeout(timeout)),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    return Err(ConnectionError::Timeout(timeout));
                }
                Behavior::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    *inner
                }
                Behavior::Sequence(steps) => steps.into_iter().next().unwrap_or(Behavior::Ok),
            }
        }
    }
}

impl std::fmt::Debug for VirtualCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VirtualCluster")
            .field("nodes", &state.nodes.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

fn node_url(index: usize) -> Result<Url, url::ParseError> {
    Url::parse(&format!("http://node-{}:9200", index))
}

fn same(a: &Url, b: &Url) -> bool {
    a.as_str().trim_end_matches('/') == b.as_str().trim_end_matches('/')
}

fn error_response(status: u16, error_type: &str, reason: &str) -> RawResponse {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({
        "error": {"type": error_type, "reason": reason},
        "status": status.as_u16(),
    });
    RawResponse::new(status, body.to_string())
}

fn nodes_info(topology: &[Url]) -> Value {
    let mut nodes = serde_json::Map::new();
    for (i, url) in topology.iter().enumerate() {
        let host = url.host_str().unwrap_or("localhost");
        let port = url.port_or_known_default().unwrap_or(9200);
        nodes.insert(
            format!("virtual-{}", i),
            json!({
                "name": host,
                "roles": ["data", "ingest", "master"],
                "http": {"publish_address": format!("{}:{}", host, port)},
            }),
        );
    }
    json!({"cluster_name": "virtual", "nodes": nodes})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nodes_answer_by_behavior() {
        let cluster = VirtualCluster::new(2)
            .with_behavior(0, Behavior::Status(503))
            .with_behavior(1, Behavior::Refuse);
        let urls = cluster.urls();
        let request = RequestSpec::get("/");

        let first = cluster
            .send(&Url::parse(&urls[0]).unwrap(), &request, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(first.status.as_u16(), 503);

        let second = cluster
            .send(&Url::parse(&urls[1]).unwrap(), &request, Duration::from_secs(1))
            .await;
        assert!(matches!(second, Err(ConnectionError::Connect(_))));
        assert_eq!(cluster.call_count(), 2);
        assert_eq!(cluster.calls_to(0).len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_items_follow_rule() {
        let cluster = VirtualCluster::new(1).with_item_rule(crate::item_rule(|item| {
            if item.id.as_deref() == Some("2") && item.seen == 1 {
                ItemReply::rejected()
            } else {
                ItemReply::Ok
            }
        }));
        let node = Url::parse(&cluster.urls()[0]).unwrap();
        let body = "{\"index\":{\"_id\":\"1\"}}\n{}\n{\"index\":{\"_id\":\"2\"}}\n{}\n";
        let request = RequestSpec::post("/logs/_bulk").ndjson(body);

        let response = cluster.send(&node, &request, Duration::from_secs(1)).await.unwrap();
        let value: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(value["errors"], true);
        assert_eq!(value["items"][0]["index"]["_index"], "logs");
        assert_eq!(value["items"][1]["index"]["status"], 429);

        let response = cluster.send(&node, &request, Duration::from_secs(1)).await.unwrap();
        let value: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(value["errors"], false);
        assert_eq!(cluster.deliveries("2"), 2);
        assert_eq!(cluster.bulk_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_routes_override_behaviour() {
        let cluster = VirtualCluster::new(1).with_route(|call| {
            call.body_text().contains("poison").then_some(Behavior::Timeout)
        });
        let node = Url::parse(&cluster.urls()[0]).unwrap();

        let ok = cluster.send(&node, &RequestSpec::get("/"), Duration::from_secs(1)).await;
        assert!(ok.is_ok());

        let request = RequestSpec::post("/x").body("poison", "text/plain");
        let failed = cluster.send(&node, &request, Duration::from_secs(1)).await;
        assert_eq!(failed.unwrap_err(), ConnectionError::Timeout(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_nodes_info_reflects_topology() {
        let cluster = VirtualCluster::new(1);
        cluster.set_topology(["http://node-7:9200"]);
        let node = Url::parse(&cluster.urls()[0]).unwrap();

        let response = cluster
            .send(&node, &RequestSpec::get("/_nodes/http"), Duration::from_secs(1))
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(
            value["nodes"]["virtual-0"]["http"]["publish_address"],
            "node-7:9200"
        );
        assert_eq!(cluster.urls().len(), 2);
    }
}
