//! Mapping of operator-reported states onto [`ClusterState`]
//!
//! Each operator reports its own state vocabulary. The mapping is a pure
//! function per operator; the only cross-cutting rules are the pause and
//! upgrade refinements applied after the base mapping.

use std::str::FromStr;

use tracing::{debug, warn};

use crate::model::ClusterState;

/// Severity order used to pick the worst replica-set member state,
/// from most to least severe
const MEMBER_SEVERITY: [ClusterState; 4] = [
    ClusterState::Invalid,
    ClusterState::Changing,
    ClusterState::Failed,
    ClusterState::Ready,
];

fn severity_rank(state: ClusterState) -> Option<usize> {
    MEMBER_SEVERITY.iter().position(|s| *s == state)
}

/// States reported by the XtraDB operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PxcState {
    /// `unknown`
    Unknown,
    /// `initializing`
    Initializing,
    /// `ready`
    Ready,
    /// `error`
    Error,
    /// `paused`
    Paused,
    /// `stopping`
    Stopping,
}

impl FromStr for PxcState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "initializing" => Ok(Self::Initializing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            "paused" => Ok(Self::Paused),
            "stopping" => Ok(Self::Stopping),
            _ => Err(()),
        }
    }
}

impl From<PxcState> for ClusterState {
    fn from(state: PxcState) -> Self {
        match state {
            PxcState::Unknown => ClusterState::Invalid,
            PxcState::Initializing => ClusterState::Changing,
            PxcState::Ready => ClusterState::Ready,
            PxcState::Error => ClusterState::Failed,
            PxcState::Paused => ClusterState::Paused,
            PxcState::Stopping => ClusterState::Changing,
        }
    }
}

/// States reported by the MongoDB operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsmdbState {
    /// `pending`
    Pending,
    /// `initializing`
    Initializing,
    /// `ready`
    Ready,
    /// `error`
    Error,
    /// `paused`
    Paused,
    /// `stopping`
    Stopping,
}

impl FromStr for PsmdbState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "initializing" => Ok(Self::Initializing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            "paused" => Ok(Self::Paused),
            "stopping" => Ok(Self::Stopping),
            _ => Err(()),
        }
    }
}

impl From<PsmdbState> for ClusterState {
    fn from(state: PsmdbState) -> Self {
        match state {
            PsmdbState::Pending | PsmdbState::Initializing | PsmdbState::Stopping => {
                ClusterState::Changing
            }
            PsmdbState::Ready => ClusterState::Ready,
            PsmdbState::Error => ClusterState::Failed,
            PsmdbState::Paused => ClusterState::Paused,
        }
    }
}

/// Map a reported state through `parse`, with the shared fallbacks.
///
/// A document the operator has not observed yet carries no state and counts
/// as Changing. Unrecognized values are logged and also count as Changing.
fn map_reported<S, F>(reported: Option<&str>, parse: F) -> ClusterState
where
    S: Into<ClusterState>,
    F: Fn(&str) -> Result<S, ()>,
{
    match reported.filter(|s| !s.is_empty()) {
        None => {
            debug!("operator has not reported a state yet");
            ClusterState::Changing
        }
        Some(raw) => match parse(raw) {
            Ok(state) => state.into(),
            Err(()) => {
                warn!(state = raw, "unrecognized operator state, treating as changing");
                ClusterState::Changing
            }
        },
    }
}

/// Classify an XtraDB cluster from its reported state
pub fn classify_pxc(reported: Option<&str>) -> ClusterState {
    map_reported(reported, PxcState::from_str)
}

/// Classify a MongoDB cluster from its aggregate and per-replica-set states.
///
/// The operator reports `error` at the top level for conditions that are
/// often transient in a single replica set. When it does, the worst member
/// state by severity wins instead, so a member that is merely
/// initializing keeps the cluster Changing.
pub fn classify_psmdb(reported: Option<&str>, members: &[Option<&str>]) -> ClusterState {
    let aggregate = map_reported(reported, PsmdbState::from_str);
    if aggregate != ClusterState::Failed {
        return aggregate;
    }

    members
        .iter()
        .map(|m| map_reported(*m, PsmdbState::from_str))
        .filter_map(|s| severity_rank(s).map(|rank| (rank, s)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, s)| s)
        .unwrap_or(aggregate)
}

/// Apply the spec-side refinements to an operator-derived state.
///
/// Ready with the pause flag set is Paused. Changing while the spec names a
/// different image than the running one is Upgrading.
pub fn refine(
    state: ClusterState,
    paused: bool,
    spec_image: Option<&str>,
    status_image: Option<&str>,
) -> ClusterState {
    match state {
        ClusterState::Ready if paused => ClusterState::Paused,
        ClusterState::Changing => match (spec_image, status_image) {
            (Some(want), Some(have)) if !have.is_empty() && want != have => ClusterState::Upgrading,
            _ => state,
        },
        other => other,
    }
}
