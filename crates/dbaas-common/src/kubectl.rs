//! Synchronous request/response wrapper around the kubectl executable
//!
//! Every call is a single-shot process: request bodies go in on stdin as
//! indented JSON, responses come back on stdout, stderr is captured for
//! diagnostics. Missing objects are reported as [`KubectlError::NotFound`]
//! so callers never inspect stderr themselves.
//!
//! Each invocation runs under a timeout and with `kill_on_drop`, so a caller
//! that gives up (deadline, dropped request) terminates the subprocess.
//! There is no retry at this layer.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::kubeconfig::KubeconfigFile;

/// Default timeout for a single kubectl invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Marker kubectl prints on stderr when the server reports a missing object
const NOT_FOUND_MARKER: &str = "(NotFound)";

/// Errors from kubectl invocations
#[derive(Debug, Error)]
pub enum KubectlError {
    /// The requested object does not exist
    #[error("{kind} {name:?} not found")]
    NotFound {
        /// Resource kind as passed to kubectl
        kind: String,
        /// Resource name
        name: String,
    },

    /// The process exited unsuccessfully
    #[error("`{command}` failed: {stderr}")]
    ExecutionFailed {
        /// Command line that was run
        command: String,
        /// Captured stderr
        stderr: String,
    },

    /// The process did not finish in time and was killed
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout {
        /// Command line that was run
        command: String,
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// The process could not be spawned or its pipes failed
    #[error("`{command}` could not be executed: {message}")]
    Io {
        /// Command line that was run
        command: String,
        /// Description of the I/O failure
        message: String,
    },

    /// A request could not be encoded or a response decoded
    #[error("invalid kubectl JSON: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl KubectlError {
    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Returns true if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for KubectlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Trait abstracting the cluster-management tool
///
/// The real implementation shells out to kubectl; tests substitute mocks
/// or in-memory fakes that play the operator's role.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait Kubectl: Send + Sync {
    /// Get a single object as JSON
    async fn get(&self, kind: &str, name: &str) -> Result<Value, KubectlError>;

    /// List all objects of a kind in the client's default scope
    async fn list(&self, kind: &str) -> Result<Vec<Value>, KubectlError>;

    /// Create or update an object
    async fn apply(&self, resource: &Value) -> Result<(), KubectlError>;

    /// Delete an object identified by its kind and metadata.name
    async fn delete(&self, resource: &Value) -> Result<(), KubectlError>;

    /// Run an arbitrary verb, returning stdout
    async fn run(&self, args: &[String], stdin: Option<Value>) -> Result<Vec<u8>, KubectlError>;
}

/// Get a single object and decode it into `T`
pub async fn get_as<T: DeserializeOwned>(
    kubectl: &dyn Kubectl,
    kind: &str,
    name: &str,
) -> Result<T, KubectlError> {
    let value = kubectl.get(kind, name).await?;
    Ok(serde_json::from_value(value)?)
}

/// List objects of a kind and decode each into `T`
pub async fn list_as<T: DeserializeOwned>(
    kubectl: &dyn Kubectl,
    kind: &str,
) -> Result<Vec<T>, KubectlError> {
    kubectl
        .list(kind)
        .await?
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(KubectlError::from))
        .collect()
}

/// Encode `resource` and apply it
pub async fn apply_as<T: Serialize + ?Sized>(
    kubectl: &dyn Kubectl,
    resource: &T,
) -> Result<(), KubectlError> {
    let value = serde_json::to_value(resource)?;
    kubectl.apply(&value).await
}

/// Encode `resource` and delete it
pub async fn delete_as<T: Serialize + ?Sized>(
    kubectl: &dyn Kubectl,
    resource: &T,
) -> Result<(), KubectlError> {
    let value = serde_json::to_value(resource)?;
    kubectl.delete(&value).await
}

/// Minimal object reference used to address deletes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    /// API version (e.g., "v1", "pxc.percona.com/v1")
    pub api_version: String,
    /// Resource kind
    pub kind: String,
    /// Object metadata (name only)
    pub metadata: ObjectRefMeta,
}

/// Metadata of an [`ObjectRef`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectRefMeta {
    /// Object name
    pub name: String,
}

impl ObjectRef {
    /// Reference an object by apiVersion, kind and name
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata: ObjectRefMeta { name: name.into() },
        }
    }
}

/// List response envelope (`kubectl get <kind> -o json`)
#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(default)]
    items: Vec<Value>,
}

/// Configuration for locating and running kubectl
#[derive(Debug, Clone)]
pub struct KubectlConfig {
    /// Program to execute
    pub program: PathBuf,
    /// Arguments inserted before every command (e.g. `["kubectl", "--"]`
    /// when the program is `minikube`)
    pub prefix_args: Vec<String>,
    /// Timeout for a single invocation
    pub timeout: Duration,
    /// Namespace passed with `-n`; kubectl's default when unset
    pub namespace: Option<String>,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("kubectl"),
            prefix_args: Vec::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            namespace: None,
        }
    }
}

/// Captured output of a finished process
struct CommandOutput {
    stdout: Vec<u8>,
}

/// [`Kubectl`] backed by the real executable
#[derive(Debug)]
pub struct KubectlCli {
    config: KubectlConfig,
    kubeconfig: Option<KubeconfigFile>,
}

impl KubectlCli {
    /// Create a client using kubectl's own configuration discovery
    pub fn new(config: KubectlConfig) -> Self {
        Self {
            config,
            kubeconfig: None,
        }
    }

    /// Create a client targeting the cluster described by `kubeconfig`
    ///
    /// The kubeconfig is validated and materialized in a temporary file that
    /// is removed when the client is dropped.
    pub fn with_kubeconfig(config: KubectlConfig, kubeconfig: &str) -> Result<Self, crate::Error> {
        let file = KubeconfigFile::create(kubeconfig)?;
        debug!(context = ?file.context(), "Using request kubeconfig");
        Ok(Self {
            config,
            kubeconfig: Some(file),
        })
    }

    fn full_args(&self, args: &[String]) -> Vec<String> {
        let mut full = self.config.prefix_args.clone();
        if let Some(file) = &self.kubeconfig {
            full.push("--kubeconfig".to_string());
            full.push(file.path().display().to_string());
        }
        if let Some(namespace) = &self.config.namespace {
            full.push("-n".to_string());
            full.push(namespace.clone());
        }
        full.extend(args.iter().cloned());
        full
    }

    fn command_line(&self, args: &[String]) -> String {
        let mut parts = vec![self.config.program.display().to_string()];
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    /// Run kubectl with `args`, feeding `stdin` if given
    async fn exec(&self, args: &[String], stdin: Option<Vec<u8>>) -> Result<CommandOutput, KubectlError> {
        let full = self.full_args(args);
        let command = self.command_line(args);
        debug!(command = %command, "Running kubectl");

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&full)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let io_error = |e: std::io::Error| KubectlError::Io {
            command: command.clone(),
            message: e.to_string(),
        };

        let mut child = cmd.spawn().map_err(io_error)?;
        // the stdin write counts against the timeout
        let finished = async move {
            if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(&data).await?;
                pipe.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.config.timeout, finished)
            .await
            .map_err(|_| {
                warn!(command = %command, timeout = ?self.config.timeout, "kubectl timed out");
                KubectlError::Timeout {
                    command: command.clone(),
                    timeout: self.config.timeout,
                }
            })?
            .map_err(io_error)?;

        if output.status.success() {
            return Ok(CommandOutput {
                stdout: output.stdout,
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(command = %command, stderr = %stderr, "kubectl failed");
        Err(KubectlError::ExecutionFailed { command, stderr })
    }

    /// Convert an execution failure into NotFound when stderr says so
    fn classify(err: KubectlError, kind: &str, name: &str) -> KubectlError {
        match err {
            KubectlError::ExecutionFailed { stderr, .. } if stderr.contains(NOT_FOUND_MARKER) => {
                KubectlError::not_found(kind, name)
            }
            other => other,
        }
    }

    /// Kind and name of a resource document, for error reporting
    fn identify(resource: &Value) -> (String, String) {
        let kind = resource
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let name = resource
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        (kind, name)
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl Kubectl for KubectlCli {
    async fn get(&self, kind: &str, name: &str) -> Result<Value, KubectlError> {
        let output = self
            .exec(&args(&["get", kind, name, "-o", "json"]), None)
            .await
            .map_err(|e| Self::classify(e, kind, name))?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn list(&self, kind: &str) -> Result<Vec<Value>, KubectlError> {
        let output = self.exec(&args(&["get", kind, "-o", "json"]), None).await?;
        let list: ItemList = serde_json::from_slice(&output.stdout)?;
        Ok(list.items)
    }

    async fn apply(&self, resource: &Value) -> Result<(), KubectlError> {
        let body = serde_json::to_vec_pretty(resource)?;
        self.exec(&args(&["apply", "-f", "-"]), Some(body)).await?;
        Ok(())
    }

    async fn delete(&self, resource: &Value) -> Result<(), KubectlError> {
        let (kind, name) = Self::identify(resource);
        let body = serde_json::to_vec_pretty(resource)?;
        self.exec(&args(&["delete", "-f", "-"]), Some(body))
            .await
            .map_err(|e| Self::classify(e, &kind, &name))?;
        Ok(())
    }

    async fn run(&self, args: &[String], stdin: Option<Value>) -> Result<Vec<u8>, KubectlError> {
        let body = stdin
            .as_ref()
            .map(serde_json::to_vec_pretty)
            .transpose()?;
        Ok(self.exec(args, body).await?.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    /// A client whose "kubectl" is a shell script receiving the real arguments
    fn scripted(script: &str) -> KubectlCli {
        KubectlCli::new(KubectlConfig {
            program: PathBuf::from("sh"),
            prefix_args: vec!["-c".to_string(), script.to_string(), "kubectl".to_string()],
            timeout: Duration::from_secs(10),
            namespace: None,
        })
    }

    #[tokio::test]
    async fn get_decodes_stdout() {
        let kubectl = scripted(r#"echo '{"kind":"Secret","metadata":{"name":"s1"}}'"#);
        let value = kubectl.get("secret", "s1").await.expect("get should succeed");
        assert_eq!(value["metadata"]["name"], "s1");
    }

    #[tokio::test]
    async fn get_passes_verb_kind_and_name() {
        let kubectl = scripted(r#"printf '{"args":"%s"}' "$*""#);
        let value = kubectl.get("pods", "p1").await.expect("get should succeed");
        assert_eq!(value["args"], "get pods p1 -o json");
    }

    /// Story: "no duplicate" checks rely on a dedicated not-found error
    #[tokio::test]
    async fn get_reports_missing_objects_as_not_found() {
        let kubectl = scripted(
            r#"echo 'Error from server (NotFound): perconaxtradbclusters.pxc.percona.com "c1" not found' >&2; exit 1"#,
        );
        let err = kubectl
            .get("PerconaXtraDBCluster", "c1")
            .await
            .expect_err("get should fail");
        match err {
            KubectlError::NotFound { kind, name } => {
                assert_eq!(kind, "PerconaXtraDBCluster");
                assert_eq!(name, "c1");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_failures_keep_command_and_stderr() {
        let kubectl = scripted("echo 'connection refused' >&2; exit 2");
        let err = kubectl.get("pods", "p1").await.expect_err("get should fail");
        match err {
            KubectlError::ExecutionFailed { command, stderr } => {
                assert!(command.contains("get pods p1"));
                assert_eq!(stderr, "connection refused");
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_unwraps_items() {
        let kubectl = scripted(r#"echo '{"kind":"List","items":[{"a":1},{"a":2}]}'"#);
        let items = kubectl.list("pods").await.expect("list should succeed");
        assert_eq!(items, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[tokio::test]
    async fn run_sends_indented_json_on_stdin() {
        let kubectl = scripted("cat");
        let body = json!({"kind": "Secret", "metadata": {"name": "s1"}});
        let stdout = kubectl
            .run(&args(&["apply", "-f", "-"]), Some(body.clone()))
            .await
            .expect("run should succeed");
        let echoed = String::from_utf8(stdout).expect("utf8");
        assert!(echoed.contains('\n'), "body should be indented");
        assert_eq!(serde_json::from_str::<Value>(&echoed).unwrap(), body);
    }

    #[tokio::test]
    async fn delete_of_missing_object_is_not_found() {
        let kubectl = scripted(r#"cat >/dev/null; echo 'Error from server (NotFound): secrets "s1" not found' >&2; exit 1"#);
        let err = kubectl
            .delete(&json!({"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "s1"}}))
            .await
            .expect_err("delete should fail");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn slow_commands_time_out() {
        let mut kubectl = scripted("sleep 5");
        kubectl.config.timeout = Duration::from_millis(100);
        let err = kubectl.list("pods").await.expect_err("list should time out");
        assert!(matches!(err, KubectlError::Timeout { .. }));
    }

    #[tokio::test]
    async fn unread_stdin_still_times_out() {
        let mut kubectl = scripted("sleep 5");
        kubectl.config.timeout = Duration::from_millis(200);
        // larger than a pipe buffer, so the write blocks until the timeout
        let body = json!({"data": "x".repeat(1 << 20)});
        let started = std::time::Instant::now();
        let err = kubectl
            .run(&args(&["apply", "-f", "-"]), Some(body))
            .await
            .expect_err("run should time out");
        assert!(matches!(err, KubectlError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let kubectl = KubectlCli::new(KubectlConfig {
            program: PathBuf::from("/nonexistent/kubectl"),
            ..Default::default()
        });
        let err = kubectl.list("pods").await.expect_err("spawn should fail");
        assert!(matches!(err, KubectlError::Io { .. }));
    }

    #[tokio::test]
    async fn typed_helpers_decode_items() {
        #[derive(Deserialize)]
        struct Item {
            a: u32,
        }
        let kubectl = scripted(r#"echo '{"items":[{"a":1},{"a":2}]}'"#);
        let items: Vec<Item> = list_as(&kubectl, "things").await.expect("list should succeed");
        assert_eq!(items.iter().map(|i| i.a).sum::<u32>(), 3);
    }

    #[test]
    fn object_ref_serializes_as_kubernetes_reference() {
        let r = ObjectRef::new("v1", "Secret", "s1");
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "s1"}})
        );
    }
}
