//! Per-request kubectl clients

use std::sync::Arc;

use dbaas_common::kubectl::{Kubectl, KubectlCli, KubectlConfig};
use dbaas_common::Result;
#[cfg(test)]
use mockall::automock;

/// Builds a kubectl client for the cluster described by a kubeconfig
#[cfg_attr(test, automock)]
pub trait KubectlFactory: Send + Sync {
    /// Client targeting the cluster in `kubeconfig`.
    ///
    /// Fails with a validation error when the kubeconfig cannot be parsed,
    /// before anything is executed.
    fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn Kubectl>>;
}

/// Factory running the kubectl executable
#[derive(Debug, Clone, Default)]
pub struct CliKubectlFactory {
    config: KubectlConfig,
}

impl CliKubectlFactory {
    /// Create a factory whose clients use `config`
    pub fn new(config: KubectlConfig) -> Self {
        Self { config }
    }
}

impl KubectlFactory for CliKubectlFactory {
    fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn Kubectl>> {
        let client = KubectlCli::with_kubeconfig(self.config.clone(), kubeconfig)?;
        Ok(Arc::new(client))
    }
}
