//! Kubernetes Deployment scaler
//!
//! Patches the `scale` subresource of a Deployment with an explicit replica
//! count, so repeated calls with the same value are harmless.

use super::WorkloadScaler;
use crate::error::{AutoscalerError, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tracing::debug;

/// Field manager recorded on scale patches
pub const FIELD_MANAGER: &str = "replica-autoscaler";

/// Scales Deployments through the Kubernetes API
#[derive(Clone)]
pub struct KubeScaler {
    client: Client,
}

impl KubeScaler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using in-cluster configuration, falling back to kubeconfig
    pub async fn try_default() -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl WorkloadScaler for KubeScaler {
    async fn set_replicas(&self, namespace: &str, deployment: &str, replicas: u32) -> Result<()> {
        let patch = serde_json::json!({
            "spec": {
                "replicas": replicas
            }
        });

        self.deployments(namespace)
            .patch_scale(
                deployment,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| AutoscalerError::ScalerCall {
                namespace: namespace.to_string(),
                deployment: deployment.to_string(),
                replicas,
                reason: e.to_string(),
            })?;

        debug!(
            namespace = %namespace,
            deployment = %deployment,
            replicas = replicas,
            "Patched deployment scale"
        );
        Ok(())
    }

    async fn current_replicas(&self, namespace: &str, deployment: &str) -> Result<Option<u32>> {
        let scale = self
            .deployments(namespace)
            .get_scale(deployment)
            .await
            .map_err(|e| AutoscalerError::ScalerCall {
                namespace: namespace.to_string(),
                deployment: deployment.to_string(),
                replicas: 0,
                reason: format!("failed to read scale: {}", e),
            })?;

        Ok(scale
            .spec
            .and_then(|s| s.replicas)
            .map(|r| r.max(0) as u32))
    }

    fn name(&self) -> &str {
        "kubernetes"
    }
}
