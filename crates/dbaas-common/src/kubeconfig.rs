//! Passthrough handling of the kubeconfig blob carried by every request
//!
//! The document is not interpreted beyond checking that it parses and naming
//! its current context for logs. It is written to a private temporary file
//! that lives as long as the request-scoped client using it.

use std::io::Write;
use std::path::Path;

use kube::config::Kubeconfig;
use tempfile::NamedTempFile;

use crate::Error;

/// A validated kubeconfig materialized on disk for the tool to read
#[derive(Debug)]
pub struct KubeconfigFile {
    file: NamedTempFile,
    context: Option<String>,
}

impl KubeconfigFile {
    /// Validate `kubeconfig` and write it to a temporary file.
    ///
    /// Returns a validation error when the blob is empty or not a kubeconfig
    /// document, before anything touches the remote cluster.
    pub fn create(kubeconfig: &str) -> Result<Self, Error> {
        if kubeconfig.trim().is_empty() {
            return Err(Error::validation_for_field(
                "kubeconfig",
                "kube_auth.kubeconfig",
                "kubeconfig is empty",
            ));
        }
        let parsed = Kubeconfig::from_yaml(kubeconfig).map_err(|e| {
            Error::validation_for_field(
                "kubeconfig",
                "kube_auth.kubeconfig",
                format!("invalid kubeconfig: {e}"),
            )
        })?;

        let mut file = tempfile::Builder::new()
            .prefix("dbaas-kubeconfig-")
            .suffix(".yaml")
            .tempfile()
            .map_err(|e| {
                Error::internal_with_context("kubeconfig", format!("failed to create file: {e}"))
            })?;
        file.write_all(kubeconfig.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| {
                Error::internal_with_context("kubeconfig", format!("failed to write file: {e}"))
            })?;

        Ok(Self {
            file,
            context: parsed.current_context,
        })
    }

    /// Path to pass as `--kubeconfig`
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// The kubeconfig's current context, if it names one
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}
