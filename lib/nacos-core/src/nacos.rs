//! Client for the Nacos node-status endpoint

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{CLIENT_PORT, NODE_STATUS_PATH};
use crate::error::Result;

/// Response of `GET /nacos/v1/core/cluster/nodes`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClusterNodes {
    pub code: i32,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub data: Vec<ClusterNode>,
}

/// One member as seen by the queried node
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNode {
    #[serde(default)]
    pub ip: String,

    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub fail_access_cnt: u32,
}

/// Queries the node-status endpoint of one instance
#[async_trait]
pub trait NodeStatusProbe: Send + Sync {
    async fn cluster_nodes(&self, pod_address: &str) -> Result<ClusterNodes>;
}

/// NodeStatusProbe over plain HTTP
pub struct HttpNodeStatusProbe {
    http: reqwest::Client,
    port: i32,
}

impl HttpNodeStatusProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            port: CLIENT_PORT,
        })
    }

    fn url(&self, pod_address: &str) -> String {
        format!("http://{}:{}{}", pod_address, self.port, NODE_STATUS_PATH)
    }
}

#[async_trait]
impl NodeStatusProbe for HttpNodeStatusProbe {
    async fn cluster_nodes(&self, pod_address: &str) -> Result<ClusterNodes> {
        let url = self.url(pod_address);
        let body = self.http.get(&url).send().await?.text().await?;
        let nodes: ClusterNodes = serde_json::from_str(&body)?;
        debug!(url = %url, code = nodes.code, members = nodes.data.len(), "node status");
        Ok(nodes)
    }
}
