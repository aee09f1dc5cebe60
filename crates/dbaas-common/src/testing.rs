//! In-memory [`Kubectl`] for tests in downstream crates
//!
//! Objects live in a map keyed by lower-cased kind and name. `apply` keeps
//! an existing object's `status`, the way the API server ignores status on
//! the main resource, so tests can play the operator by editing status
//! directly with [`FakeKubectl::update`].

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::kubectl::{Kubectl, KubectlError};

type RunHandler = Box<dyn Fn(&[String]) -> Result<Vec<u8>, KubectlError> + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn key(kind: &str, name: &str) -> (String, String) {
    (kind.to_ascii_lowercase(), name.to_string())
}

fn identify(resource: &Value) -> Result<(String, String), KubectlError> {
    let kind = resource.get("kind").and_then(Value::as_str);
    let name = resource.pointer("/metadata/name").and_then(Value::as_str);
    match (kind, name) {
        (Some(kind), Some(name)) => Ok(key(kind, name)),
        _ => Err(KubectlError::Serialization {
            message: "resource is missing kind or metadata.name".to_string(),
        }),
    }
}

/// Fake kubectl backed by an in-memory object store
#[derive(Default)]
pub struct FakeKubectl {
    objects: Mutex<BTreeMap<(String, String), Value>>,
    calls: Mutex<Vec<String>>,
    run_handler: Mutex<Option<RunHandler>>,
}

impl std::fmt::Debug for FakeKubectl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeKubectl")
            .field("objects", &lock(&self.objects).len())
            .finish_non_exhaustive()
    }
}

impl FakeKubectl {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `resource` as-is, including any status
    pub fn insert(&self, resource: Value) {
        if let Ok(k) = identify(&resource) {
            lock(&self.objects).insert(k, resource);
        }
    }

    /// Current document of an object
    pub fn object(&self, kind: &str, name: &str) -> Option<Value> {
        lock(&self.objects).get(&key(kind, name)).cloned()
    }

    /// Edit an object in place; returns false when it does not exist
    pub fn update(&self, kind: &str, name: &str, edit: impl FnOnce(&mut Value)) -> bool {
        match lock(&self.objects).get_mut(&key(kind, name)) {
            Some(value) => {
                edit(value);
                true
            }
            None => false,
        }
    }

    /// Remove an object without recording a call
    pub fn remove(&self, kind: &str, name: &str) -> Option<Value> {
        lock(&self.objects).remove(&key(kind, name))
    }

    /// Every call made so far, as `"<verb> <kind>/<name>"` or the joined args of `run`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Answer `run` calls with `handler`
    pub fn on_run(
        &self,
        handler: impl Fn(&[String]) -> Result<Vec<u8>, KubectlError> + Send + Sync + 'static,
    ) {
        *lock(&self.run_handler) = Some(Box::new(handler));
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl Kubectl for FakeKubectl {
    async fn get(&self, kind: &str, name: &str) -> Result<Value, KubectlError> {
        self.record(format!("get {kind}/{name}"));
        self.object(kind, name)
            .ok_or_else(|| KubectlError::not_found(kind, name))
    }

    async fn list(&self, kind: &str) -> Result<Vec<Value>, KubectlError> {
        self.record(format!("list {kind}"));
        let kind = kind.to_ascii_lowercase();
        Ok(lock(&self.objects)
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn apply(&self, resource: &Value) -> Result<(), KubectlError> {
        let k = identify(resource)?;
        self.record(format!("apply {}/{}", k.0, k.1));
        let mut objects = lock(&self.objects);
        let mut stored = resource.clone();
        if let Some(status) = objects.get(&k).and_then(|old| old.get("status")).cloned() {
            if let Some(map) = stored.as_object_mut() {
                map.insert("status".to_string(), status);
            }
        }
        objects.insert(k, stored);
        Ok(())
    }

    async fn delete(&self, resource: &Value) -> Result<(), KubectlError> {
        let k = identify(resource)?;
        self.record(format!("delete {}/{}", k.0, k.1));
        match lock(&self.objects).remove(&k) {
            Some(_) => Ok(()),
            None => Err(KubectlError::not_found(k.0, k.1)),
        }
    }

    async fn run(&self, args: &[String], _stdin: Option<Value>) -> Result<Vec<u8>, KubectlError> {
        self.record(args.join(" "));
        match &*lock(&self.run_handler) {
            Some(handler) => handler(args),
            None => Ok(Vec::new()),
        }
    }
}
