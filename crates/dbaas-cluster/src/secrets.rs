//! Per-cluster credential secrets
//!
//! Each operator ships a template secret with every key it expects. A new
//! cluster gets a copy of that template with the admin password replaced by
//! a random one. The secret is read back for credential requests and deleted
//! alongside the cluster.

use std::collections::BTreeMap;

use dbaas_common::kubectl::{apply_as, delete_as, get_as, Kubectl, ObjectRef};
use dbaas_common::{Error, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use rand::Rng;
use tracing::{debug, warn};

/// Length of generated passwords
pub const PASSWORD_LENGTH: usize = 24;

/// Characters accepted by both operators in passwords
const PASSWORD_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a random password from the shared safe alphabet
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    (0..PASSWORD_LENGTH)
        .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}

/// Create `secret_name` from the template `template_name`, overriding `overrides`.
///
/// A missing template is an internal error: the operator installation is
/// incomplete, which the caller cannot fix by changing the request.
pub async fn provision_secret(
    kubectl: &dyn Kubectl,
    template_name: &str,
    secret_name: &str,
    overrides: BTreeMap<String, String>,
) -> Result<()> {
    let template: Secret = match get_as(kubectl, "Secret", template_name).await {
        Ok(secret) => secret,
        Err(e) if e.is_not_found() => {
            return Err(Error::internal_with_context(
                "secrets",
                format!("template secret {template_name:?} not found"),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    let mut data = template.data.unwrap_or_default();
    for (key, value) in template.string_data.unwrap_or_default() {
        data.entry(key).or_insert_with(|| ByteString(value.into_bytes()));
    }
    for (key, value) in overrides {
        data.insert(key, ByteString(value.into_bytes()));
    }

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name.to_string()),
            ..Default::default()
        },
        type_: Some(template.type_.unwrap_or_else(|| "Opaque".to_string())),
        data: Some(data),
        ..Default::default()
    };
    apply_as(kubectl, &secret).await?;
    debug!(secret = secret_name, template = template_name, "Created cluster secret");
    Ok(())
}

/// Read a secret's data as UTF-8 strings
pub async fn read_secret(kubectl: &dyn Kubectl, name: &str) -> Result<BTreeMap<String, String>> {
    let secret: Secret = get_as(kubectl, "Secret", name).await?;
    secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(key, ByteString(bytes))| {
            String::from_utf8(bytes)
                .map(|value| (key.clone(), value))
                .map_err(|_| {
                    Error::internal_with_context(
                        "secrets",
                        format!("key {key:?} of secret {name:?} is not UTF-8"),
                    )
                })
        })
        .collect()
}

/// Pick a required key out of secret data
pub fn required_key<'a>(
    data: &'a BTreeMap<String, String>,
    secret: &str,
    key: &str,
) -> Result<&'a str> {
    data.get(key).map(String::as_str).ok_or_else(|| {
        Error::internal_with_context("secrets", format!("secret {secret:?} has no key {key:?}"))
    })
}

/// Delete a cluster secret, logging instead of failing.
///
/// Called after the custom resource is deleted. Teardown has already
/// started at that point, and a leftover secret must not make deletion fail
/// or become non-idempotent.
pub async fn delete_secret_best_effort(kubectl: &dyn Kubectl, name: &str) {
    match delete_as(kubectl, &ObjectRef::new("v1", "Secret", name)).await {
        Ok(()) => debug!(secret = name, "Deleted cluster secret"),
        Err(e) if e.is_not_found() => debug!(secret = name, "Cluster secret already gone"),
        Err(e) => warn!(secret = name, error = %e, "Failed to delete cluster secret"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbaas_common::kubectl::{KubectlError, MockKubectl};
    use dbaas_common::testing::FakeKubectl;
    use serde_json::json;

    fn template(fake: &FakeKubectl) {
        fake.insert(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "my-cluster-secrets", "resourceVersion": "7"},
            "type": "Opaque",
            "data": {
                // "root_password", "operator_password"
                "root": "cm9vdF9wYXNzd29yZA==",
                "operator": "b3BlcmF0b3JfcGFzc3dvcmQ="
            }
        }));
    }

    #[test]
    fn passwords_use_the_safe_alphabet() {
        let password = generate_password();
        assert_eq!(password.len(), PASSWORD_LENGTH);
        assert!(password.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
        assert_ne!(password, generate_password());
    }

    /// Story: a new cluster's secret is the template with a fresh admin password
    #[tokio::test]
    async fn story_secret_is_cloned_from_template() {
        let fake = FakeKubectl::new();
        template(&fake);

        provision_secret(
            &fake,
            "my-cluster-secrets",
            "dbaas-c1-pxc-secrets",
            BTreeMap::from([("root".to_string(), "s3cret".to_string())]),
        )
        .await
        .unwrap();

        let data = read_secret(&fake, "dbaas-c1-pxc-secrets").await.unwrap();
        assert_eq!(data["root"], "s3cret");
        assert_eq!(data["operator"], "operator_password");

        let stored = fake.object("Secret", "dbaas-c1-pxc-secrets").unwrap();
        assert_eq!(stored["type"], "Opaque");
        assert!(stored["metadata"].get("resourceVersion").is_none());
    }

    #[tokio::test]
    async fn missing_template_is_internal_error() {
        let fake = FakeKubectl::new();
        let err = provision_secret(&fake, "my-cluster-secrets", "s", BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
        assert!(fake.calls().iter().all(|c| !c.starts_with("apply")));
    }

    #[test]
    fn required_key_names_missing_key() {
        let data = BTreeMap::from([("root".to_string(), "pw".to_string())]);
        assert_eq!(required_key(&data, "s", "root").unwrap(), "pw");
        let err = required_key(&data, "s", "MONGODB_USER_ADMIN_USER").unwrap_err();
        assert!(err.to_string().contains("MONGODB_USER_ADMIN_USER"));
    }

    /// Story: secret deletion failures never surface to the caller
    #[tokio::test]
    async fn story_secret_deletion_failure_is_swallowed() {
        let mut kubectl = MockKubectl::new();
        kubectl.expect_delete().times(1).returning(|_| {
            Err(KubectlError::ExecutionFailed {
                command: "kubectl delete -f -".to_string(),
                stderr: "forbidden".to_string(),
            })
        });
        delete_secret_best_effort(&kubectl, "dbaas-c1-pxc-secrets").await;
    }
}
