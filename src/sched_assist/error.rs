//! Setup-time errors.
//!
//! Decision paths never return these: a scheduler hook has no error channel,
//! so every runtime failure degrades to "keep the kernel's default".

use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssistError {
    /// More clusters than `MAX_CLUSTERS`
    TooManyClusters(usize),
    /// Cluster with no CPUs
    EmptyCluster(usize),
    /// CPU listed in more than one cluster
    OverlappingCluster { cpu: usize },
    /// CPU id outside `0..MAX_CPUS`
    CpuOutOfRange(usize),
    /// Per-CPU UX queue has no free slot
    UxQueueFull { cpu: usize },
    /// Task already sits in some CPU's UX queue
    AlreadyQueued { cpu: usize },
    /// Task arena has no free slot
    ArenaFull,
    /// Collaborator chain has no free slot
    ChainFull,
    UnknownKey,
    InvalidValue,
    /// Global engine was installed twice
    AlreadyInitialized,
}

impl fmt::Display for AssistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssistError::TooManyClusters(n) => write!(f, "too many clusters ({})", n),
            AssistError::EmptyCluster(idx) => write!(f, "cluster {} has no cpus", idx),
            AssistError::OverlappingCluster { cpu } => {
                write!(f, "cpu{} belongs to more than one cluster", cpu)
            }
            AssistError::CpuOutOfRange(cpu) => write!(f, "cpu{} out of range", cpu),
            AssistError::UxQueueFull { cpu } => write!(f, "cpu{} ux queue full", cpu),
            AssistError::AlreadyQueued { cpu } => {
                write!(f, "task already queued on cpu{} ux queue", cpu)
            }
            AssistError::ArenaFull => f.write_str("task arena full"),
            AssistError::ChainFull => f.write_str("collaborator chain full"),
            AssistError::UnknownKey => f.write_str("unknown configuration key"),
            AssistError::InvalidValue => f.write_str("invalid configuration value"),
            AssistError::AlreadyInitialized => f.write_str("engine already initialized"),
        }
    }
}
