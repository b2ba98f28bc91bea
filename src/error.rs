//! Error types for topology operations.

use thiserror::Error;

use crate::RouterId;

/// Errors returned by direct misuse of the topology API.
///
/// In-cascade delivery to a removed router is not an error; it is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The operation names a router that is not in the topology.
    #[error("unknown node {0}")]
    UnknownNode(RouterId),

    /// A router cannot be its own neighbor.
    #[error("node {0} cannot link to itself")]
    SelfLoop(RouterId),

    /// The weight reaches the infinity threshold, which is reserved for link removal.
    #[error("invalid weight {weight}: must be below {limit}")]
    InvalidWeight { weight: u64, limit: u64 },

    /// A router with this identifier already exists.
    #[error("node {0} already exists")]
    DuplicateNode(RouterId),

    /// A cascade delivered more messages than the configured budget allows.
    /// The undelivered remainder was discarded, so tables may not have converged.
    #[error("no convergence within {limit} messages")]
    NotConverged { limit: u64 },

    /// A router task of the concurrent engine is no longer running.
    #[error("routing engine stopped")]
    EngineStopped,
}

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, Error>;
