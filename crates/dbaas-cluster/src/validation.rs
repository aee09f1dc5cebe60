//! Request validation, run before anything touches the remote cluster

use dbaas_common::{Error, Result};

use crate::model::UpdateParams;

/// Longest cluster name accepted.
///
/// Both operators derive StatefulSet, Service and PVC names from the
/// cluster name, and the longest suffixes must still fit in a DNS label.
pub const MAX_NAME_LENGTH: usize = 22;

/// Check that `name` can be used as a cluster name
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation_for_field(name, "name", "cluster name is required"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::validation_for_field(
            name,
            "name",
            format!("cluster name must be at most {MAX_NAME_LENGTH} characters"),
        ));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let starts_with_letter = name.starts_with(|c: char| c.is_ascii_lowercase());
    let ends_alphanumeric = name.ends_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !(valid_chars && starts_with_letter && ends_alphanumeric) {
        return Err(Error::validation_for_field(
            name,
            "name",
            "cluster name must be lower-case alphanumeric or '-', start with a letter and end with an alphanumeric character",
        ));
    }
    Ok(())
}

/// Check a requested cluster size
pub fn validate_size(cluster: &str, size: u32) -> Result<()> {
    replica_count(cluster, size).map(|_| ())
}

/// Convert a requested size into the replica count custom resources carry
pub fn replica_count(cluster: &str, size: u32) -> Result<i32> {
    if size == 0 {
        return Err(Error::validation_for_field(
            cluster,
            "params.cluster_size",
            "cluster size must be at least 1",
        ));
    }
    i32::try_from(size).map_err(|_| {
        Error::validation_for_field(
            cluster,
            "params.cluster_size",
            format!("cluster size must be at most {}", i32::MAX),
        )
    })
}

/// Check an update request.
///
/// Suspend and resume together is contradictory; a size of zero is not a
/// way to say "unchanged", that is what an absent size means.
pub fn validate_update(params: &UpdateParams) -> Result<()> {
    validate_name(&params.name)?;
    if params.suspend && params.resume {
        return Err(Error::validation_for_field(
            &params.name,
            "params.suspend",
            "suspend and resume are mutually exclusive",
        ));
    }
    if let Some(size) = params.size {
        validate_size(&params.name, size)?;
    }
    Ok(())
}
