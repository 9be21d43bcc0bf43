//! Error types for ring tree construction and ring convergence.

use std::io;
use thiserror::Error;

use crate::convergence::RingState;
use crate::partitioning::RingRegion;
use crate::types::NodeId;

/// Result type alias for ring tree operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the ring tree crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The partitioner could not satisfy the weighted constraints for a node
    /// at any tolerance it tried. Aborts the whole tree build.
    #[error("structural build error at node {node}: {reason}")]
    StructuralBuild { node: NodeId, reason: String },

    /// Two ring version identifiers of different rings were compared.
    #[error("incomparable ring identifiers: {left} vs {right}")]
    Incomparable { left: String, right: String },

    /// A ring state transition violated the transition table.
    #[error("invalid ring state transition: {from} -> {to}")]
    InvalidRingTransition { from: RingState, to: RingState },

    /// A region would be left without a non-excluded primary owner.
    #[error("convergence infeasible: no viable primary owner for region {region} (owners: {owners:?})")]
    InfeasibleConvergence { region: RingRegion, owners: Vec<NodeId> },

    /// Malformed topology.
    #[error("topology error: {0}")]
    Topology(String),

    /// Node not present in the topology.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Malformed or misapplied storage policy.
    #[error("storage policy error: {0}")]
    Policy(String),

    /// Storage policy name not present in the policy group.
    #[error("storage policy not found: {0}")]
    PolicyNotFound(String),

    /// A ring violates its own invariants.
    #[error("invalid ring: {0}")]
    InvalidRing(String),

    /// No ring state has been begun for this ring and participant.
    #[error("ring state not found: ring {ring}, participant {participant}")]
    RingStateNotFound { ring: String, participant: NodeId },

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),

    /// Input could not be parsed.
    #[error("parse error in {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    /// A key already holds the largest representable version.
    #[error("version counter exhausted at {0}")]
    VersionExhausted(u64),

    /// Ring state persistence failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error must gate a commit rather than abort the caller.
    pub fn is_advisory(&self) -> bool {
        matches!(self, Error::InfeasibleConvergence { .. })
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Parse {
            source_name: "ring tree snapshot".to_string(),
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse {
            source_name: "json".to_string(),
            reason: e.to_string(),
        }
    }
}
