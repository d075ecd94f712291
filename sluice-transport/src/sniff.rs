//! Node discovery from the nodes info API.

use crate::node::{Node, NodeRoles};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Which discovered nodes join the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SniffFilter {
    /// Keep every node with an HTTP address.
    All,
    /// Drop dedicated master nodes.
    #[default]
    ExcludeMasterOnly,
    /// Keep data nodes only.
    DataOnly,
}

impl SniffFilter {
    /// Whether a node with these roles passes the filter.
    pub fn accepts(&self, roles: &NodeRoles) -> bool {
        match self {
            Self::All => true,
            Self::ExcludeMasterOnly => !roles.is_master_only(),
            Self::DataOnly => roles.data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodesInfo {
    #[serde(default)]
    nodes: BTreeMap<String, NodeInfo>,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    roles: Option<Vec<String>>,
    #[serde(default)]
    http: Option<HttpInfo>,
}

#[derive(Debug, Deserialize)]
struct HttpInfo {
    #[serde(default)]
    publish_address: Option<String>,
}

/// A `publish_address` value.
///
/// The cluster reports either a bare `host:port` or `fqdn/ip:port`; the host
/// name is preferred when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishAddress {
    /// `ip:port` or `[ipv6]:port`.
    Plain {
        /// Host or IP literal.
        host: String,
        /// Port.
        port: u16,
    },
    /// `fqdn/ip:port`.
    Named {
        /// Host name.
        fqdn: String,
        /// IP literal.
        ip: String,
        /// Port.
        port: u16,
    },
}

impl PublishAddress {
    /// Parse a publish address. Returns `None` for values without a port.
    pub fn parse(raw: &str) -> Option<Self> {
        let (fqdn, address) = match raw.split_once('/') {
            Some((fqdn, address)) => (Some(fqdn), address),
            None => (None, raw),
        };
        let (host, port) = address.rsplit_once(':')?;
        let port = port.parse().ok()?;
        if host.is_empty() {
            return None;
        }

        Some(match fqdn {
            Some(fqdn) if !fqdn.is_empty() => Self::Named {
                fqdn: fqdn.to_string(),
                ip: host.to_string(),
                port,
            },
            _ => Self::Plain {
                host: host.to_string(),
                port,
            },
        })
    }

    /// Host used to reach the node.
    pub fn host(&self) -> &str {
        match self {
            Self::Plain { host, .. } => host,
            Self::Named { fqdn, .. } => fqdn,
        }
    }

    /// Port.
    pub fn port(&self) -> u16 {
        match self {
            Self::Plain { port, .. } | Self::Named { port, .. } => *port,
        }
    }

    /// Build the endpoint URL for the given scheme.
    pub fn to_url(&self, scheme: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}://{}:{}", scheme, self.host(), self.port()))
    }
}

/// Parse a nodes info response into pool nodes.
///
/// Nodes without an HTTP publish address, and those rejected by `filter`, are
/// skipped. Nodes that report no roles are treated as having every role.
pub fn parse_nodes_info(
    body: &[u8],
    scheme: &str,
    filter: SniffFilter,
) -> Result<Vec<Node>, serde_json::Error> {
    let info: NodesInfo = serde_json::from_slice(body)?;
    let mut nodes = Vec::with_capacity(info.nodes.len());

    for (id, node) in info.nodes {
        let Some(raw) = node.http.and_then(|http| http.publish_address) else {
            debug!(node_id = %id, "Skipping node without HTTP publish address");
            continue;
        };
        let Some(address) = PublishAddress::parse(&raw) else {
            debug!(node_id = %id, address = %raw, "Skipping unparsable publish address");
            continue;
        };
        let url = match address.to_url(scheme) {
            Ok(url) => url,
            Err(e) => {
                debug!(node_id = %id, address = %raw, error = %e, "Skipping invalid node address");
                continue;
            }
        };

        let roles = node
            .roles
            .map(NodeRoles::from_names)
            .unwrap_or_else(NodeRoles::all);
        if !filter.accepts(&roles) {
            debug!(node_id = %id, "Skipping node rejected by sniff filter");
            continue;
        }

        let mut discovered = Node::new(url).with_id(id).with_roles(roles);
        if let Some(name) = node.name {
            discovered = discovered.with_name(name);
        }
        nodes.push(discovered);
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODES_INFO: &str = r#"{
        "cluster_name": "test",
        "nodes": {
            "a1": {
                "name": "data-1",
                "roles": ["data", "ingest", "master"],
                "http": { "publish_address": "es-1.local/10.0.0.1:9200" }
            },
            "b2": {
                "name": "master-1",
                "roles": ["master"],
                "http": { "publish_address": "10.0.0.2:9200" }
            },
            "c3": {
                "name": "coord-1",
                "roles": [],
                "http": { "publish_address": "[::1]:9201" }
            },
            "d4": {
                "name": "no-http",
                "roles": ["data"]
            }
        }
    }"#;

    #[test]
    fn test_publish_address_forms() {
        assert_eq!(
            PublishAddress::parse("10.0.0.1:9200"),
            Some(PublishAddress::Plain {
                host: "10.0.0.1".into(),
                port: 9200
            })
        );

        let named = PublishAddress::parse("es-1.local/10.0.0.1:9200").unwrap();
        assert_eq!(named.host(), "es-1.local");

        let v6 = PublishAddress::parse("[::1]:9200").unwrap();
        assert_eq!(v6.host(), "[::1]");
        assert_eq!(v6.to_url("http").unwrap().as_str(), "http://[::1]:9200/");

        assert_eq!(PublishAddress::parse("10.0.0.1"), None);
        assert_eq!(PublishAddress::parse(":9200"), None);
    }

    #[test]
    fn test_parse_nodes_info_excludes_master_only() {
        let nodes = parse_nodes_info(NODES_INFO.as_bytes(), "http", SniffFilter::ExcludeMasterOnly).unwrap();

        let urls: Vec<&str> = nodes.iter().map(|n| n.url().as_str()).collect();
        assert_eq!(urls, ["http://es-1.local:9200/", "http://[::1]:9201/"]);
        assert_eq!(nodes[0].id(), Some("a1"));
        assert_eq!(nodes[0].name(), Some("data-1"));
    }

    #[test]
    fn test_parse_nodes_info_filters() {
        let all = parse_nodes_info(NODES_INFO.as_bytes(), "https", SniffFilter::All).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].url().scheme(), "https");

        let data = parse_nodes_info(NODES_INFO.as_bytes(), "http", SniffFilter::DataOnly).unwrap();
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_missing_roles_means_all_roles() {
        let body = r#"{"nodes":{"x":{"http":{"publish_address":"127.0.0.1:9200"}}}}"#;
        let nodes = parse_nodes_info(body.as_bytes(), "http", SniffFilter::DataOnly).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].roles(), NodeRoles::all());
    }

    #[test]
    fn test_malformed_body_is_error() {
        assert!(parse_nodes_info(b"not json", "http", SniffFilter::All).is_err());
    }
}
