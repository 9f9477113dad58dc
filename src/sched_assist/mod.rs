//! UX task assist
//!
//! Placement and preemption policy for user-experience ("UX") tasks on
//! asymmetric multi-cluster CPUs. The host scheduler stays in charge; this
//! module only answers its hook questions:
//!
//! - where should a waking UX task run ([`search`])
//! - may a task migrate to a given CPU ([`skip`])
//! - should a waking task preempt the running one ([`preempt`])
//! - which UX task should run next on a CPU ([`pick`])
//!
//! Host state is reached through [`SchedEnv`]; the state owned here (cluster
//! topology, per-CPU UX queues, optional collaborators, counters) lives in
//! an [`Engine`]. Tunables are published through [`config::global`].
//!
//! ## Module layout
//!
//! - `types`: masks, tags, task and run-queue views
//! - `topology`: capacity clusters and the cluster walk
//! - `config`: tunables and directive parsing
//! - `classify`: pure task predicates and scene-preferred cluster
//! - `util`: CPU utilization and spare capacity estimates
//! - `percpu`: per-CPU UX run queues
//! - `collab`: optional subsystems consulted by the hooks
//! - `slot`: lock-free seq-stamped slots shared by config and stats
//! - `stats`: counters and placement trace ring
//! - `hooks`: engine and hook entry points

pub mod classify;
pub mod collab;
pub mod config;
pub mod env;
pub mod error;
pub mod hooks;
pub mod percpu;
pub mod pick;
pub mod preempt;
pub mod search;
pub mod skip;
pub mod slot;
pub mod stats;
pub mod topology;
pub mod types;
pub mod util;

pub use collab::{CollabRole, Collaborator, Collaborators, PreemptDecision, VetoChain};
pub use config::{AssistConfig, CapacitySource, ConfigPublisher, DebugFlags, GroupAdjust};
pub use env::{AssistCtx, IrqControl, Machine, NoIrqControl, SchedEnv, TaskArena};
pub use error::AssistError;
pub use hooks::{engine, install, Engine, EngineState};
pub use percpu::{UxEntry, UxRunQueue, UxRunQueues};
pub use search::{pick_cpu_for_ux_task, select_ux_cpu, Placement, PlacementTier};
pub use skip::{should_skip_cpu, SkipReason};
pub use stats::{list_stats, AssistStats, StatsSnapshot, TraceRecord};
pub use topology::{Cluster, ClusterTopology, ClusterWalk};
pub use types::{
    CpuId, CpuMask, CpuRq, GroupClass, ImFlags, Scene, Task, TaskId, UxType, MAX_CLUSTERS, MAX_CPUS,
};
