//! Ensurer drives the live child resources toward the declared spec

use std::sync::Arc;

use kube::ResourceExt;
use nacos_api::Nacos;
use tracing::debug;

use crate::apply::{apply, Applied};
use crate::client::KubeApi;
use crate::constants::ClusterType;
use crate::error::Result;
use crate::manifest::ManifestBuilder;

pub struct Ensurer<C> {
    client: Arc<C>,
    cluster_domain: String,
}

impl<C: KubeApi> Ensurer<C> {
    pub fn new(client: Arc<C>, cluster_domain: impl Into<String>) -> Self {
        Self {
            client,
            cluster_domain: cluster_domain.into(),
        }
    }

    /// Apply every child object of `nacos`. Stops at the first failure.
    pub async fn ensure(&self, nacos: &Nacos) -> Result<Vec<Applied>> {
        let builder = ManifestBuilder::new(nacos, &self.cluster_domain)?;
        let namespace = builder.namespace();
        let client = self.client.as_ref();

        let mut applied = vec![
            apply(client, namespace, builder.config_map()).await?,
            apply(client, namespace, builder.stateful_set()).await?,
        ];

        match builder.cluster_type() {
            ClusterType::Standalone => {
                applied.push(apply(client, namespace, builder.service()).await?);
            }
            ClusterType::Cluster => {
                applied.push(apply(client, namespace, builder.headless_service()).await?);
                applied.push(apply(client, namespace, builder.service()).await?);
            }
        }

        debug!(
            namespace = %namespace,
            name = %nacos.name_any(),
            mode = %builder.cluster_type(),
            ?applied,
            "ensured child resources"
        );
        Ok(applied)
    }
}
