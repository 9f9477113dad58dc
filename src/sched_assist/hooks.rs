//! Scheduler hook entry points
//!
//! [`Engine`] holds the topology and collaborators, borrows the per-CPU UX
//! queues and counters from a static [`EngineState`], and exposes one
//! method per scheduler hook, in the shape of the vendor hooks:
//! out-parameters are only ever tightened, never reset.
//!
//! Kernel glue installs a single engine with [`install`] and calls the free
//! functions at the bottom of this module; they read the global
//! configuration publisher once per call and do nothing until an engine is
//! installed.

use spin::Once;

use super::classify;
use super::collab::{CollabRole, Collaborator, Collaborators, PreemptDecision};
use super::config::{self, AssistConfig};
use super::env::{AssistCtx, IrqControl, SchedEnv};
use super::error::AssistError;
use super::percpu::UxRunQueues;
use super::pick::replace_next_task;
use super::preempt::check_preempt_wakeup;
use super::search::pick_cpu_for_ux_task;
use super::skip::should_skip_cpu;
use super::stats::AssistStats;
use super::topology::ClusterTopology;
use super::types::{CpuId, GroupClass, Task, TaskId};

/// Per-CPU UX queues and counters.
///
/// Far too large for a kernel stack, so it is built at compile time into
/// static storage and engines borrow it:
///
/// ```ignore
/// static ASSIST_STATE: EngineState = EngineState::with_irq_control(&KERNEL_IRQ);
/// install(Engine::new(topology, &ASSIST_STATE))?;
/// ```
pub struct EngineState {
    queues: UxRunQueues,
    stats: AssistStats,
}

impl EngineState {
    pub const fn new() -> Self {
        Self {
            queues: UxRunQueues::new(),
            stats: AssistStats::new(),
        }
    }

    pub const fn with_irq_control(irq: &'static dyn IrqControl) -> Self {
        Self {
            queues: UxRunQueues::with_irq_control(irq),
            stats: AssistStats::new(),
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Engine {
    topo: ClusterTopology,
    collab: Collaborators,
    state: &'static EngineState,
}

impl Engine {
    pub const fn new(topo: ClusterTopology, state: &'static EngineState) -> Self {
        Self {
            topo,
            collab: Collaborators::new(),
            state,
        }
    }

    /// Register an optional subsystem. Only possible before installation.
    pub fn register(
        &mut self,
        role: CollabRole,
        priority: u8,
        collaborator: &'static dyn Collaborator,
    ) -> Result<(), AssistError> {
        self.collab.register(role, priority, collaborator)
    }

    pub fn topology(&self) -> &ClusterTopology {
        &self.topo
    }

    pub fn queues(&self) -> &'static UxRunQueues {
        &self.state.queues
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    pub fn stats(&self) -> &'static AssistStats {
        &self.state.stats
    }

    /// Bundle the engine with a host view and a configuration snapshot.
    pub fn ctx<'a, E: SchedEnv + ?Sized>(&'a self, env: &'a E, cfg: &'a AssistConfig) -> AssistCtx<'a, E> {
        AssistCtx {
            env,
            cfg,
            topo: &self.topo,
            queues: &self.state.queues,
            collab: &self.collab,
            stats: &self.state.stats,
        }
    }

    // ------------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------------

    /// `select_task_rq` override: moves `target` to a better CPU for a UX
    /// task. Returns true if `target` changed.
    pub fn select_task_rq<E: SchedEnv + ?Sized>(
        &self,
        env: &E,
        cfg: &AssistConfig,
        task: &Task,
        target: &mut Option<CpuId>,
    ) -> bool {
        pick_cpu_for_ux_task(&self.ctx(env, cfg), task, target)
    }

    /// `can_migrate_task`: the skip filter first, then the frame-boost veto
    /// chain if migration is still allowed.
    pub fn can_migrate_task<E: SchedEnv + ?Sized>(
        &self,
        env: &E,
        cfg: &AssistConfig,
        task: &Task,
        dst_cpu: CpuId,
        can_migrate: &mut bool,
    ) {
        let ctx = self.ctx(env, cfg);
        if should_skip_cpu(&ctx, task, dst_cpu) {
            *can_migrate = false;
        }
        if !*can_migrate {
            return;
        }
        if self.collab.frame_boost.try_veto_migration(task, task.cpu, dst_cpu) == Some(true) {
            self.state.stats.record_migrate_veto();
            *can_migrate = false;
        }
    }

    // ------------------------------------------------------------------------
    // Preemption and pick-next
    // ------------------------------------------------------------------------

    /// `check_preempt_wakeup_fair`: locking protect gets the first word and
    /// a no-preempt from it is final.
    pub fn check_preempt_wakeup_fair<E: SchedEnv + ?Sized>(
        &self,
        env: &E,
        cfg: &AssistConfig,
        cpu: CpuId,
        wake: &Task,
        preempt: &mut bool,
        nopreempt: &mut bool,
    ) {
        let ctx = self.ctx(env, cfg);
        let curr = ctx.curr_task(cpu);

        self.collab
            .locking_protect
            .check_preempt(cpu, wake, curr)
            .apply(preempt, nopreempt);
        if *nopreempt {
            return;
        }

        check_preempt_wakeup(&ctx, cpu, wake).apply(preempt, nopreempt);
    }

    /// `replace_next_task_fair`: UX queue first, then locking protect, then
    /// the deadline scheduler, each only while nothing was picked.
    pub fn replace_next_task_fair<E: SchedEnv + ?Sized>(
        &self,
        env: &E,
        cfg: &AssistConfig,
        cpu: CpuId,
        next: &mut Option<TaskId>,
        repick: &mut bool,
    ) {
        if cfg.ext_sched_active {
            return;
        }

        let ctx = self.ctx(env, cfg);
        let pick = replace_next_task(&ctx, cpu)
            .or_else(|| self.collab.locking_protect.replace_next(cpu))
            .or_else(|| self.collab.deadline.replace_next(cpu));

        if let Some(task) = pick {
            *next = Some(task);
            *repick = true;
        }
    }

    /// EEVDF-compatible `update_deadline`: a running UX queue member must
    /// not be preempted by the slice deadline.
    pub fn update_deadline<E: SchedEnv + ?Sized>(&self, env: &E, cfg: &AssistConfig, cpu: CpuId) -> bool {
        if !cfg.eevdf_compat {
            return false;
        }
        match env.curr_task(cpu) {
            Some(curr) => self.state.queues.is_queued_on(cpu, curr.id),
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Entity events
    // ------------------------------------------------------------------------

    /// `enqueue_entity`: observers first, then UX queue membership.
    pub fn enqueue_entity(&self, cfg: &AssistConfig, cpu: CpuId, task: &Task) {
        self.collab.locking_protect.notify_enqueue(cpu, task);
        self.collab.deadline.notify_enqueue(cpu, task);

        if !cfg.enabled || !task.is_ux() {
            return;
        }
        if let Err(err) = self.state.queues.enqueue_ux_task(cpu, task) {
            crate::kdebug!("sched_assist: enqueue pid {} on cpu{}: {}", task.pid, cpu, err);
        }
    }

    /// `dequeue_entity`: observers, then drop UX queue membership.
    pub fn dequeue_entity(&self, cpu: CpuId, task: &Task) {
        self.collab.locking_protect.notify_dequeue(cpu, task);
        self.collab.deadline.notify_dequeue(cpu, task);
        self.state.queues.dequeue_ux_task(cpu, task.id);
    }

    pub fn account_ux_runtime(&self, cpu: CpuId, task: TaskId, delta_exec_ns: u64) -> bool {
        self.state.queues.account_ux_runtime(cpu, task, delta_exec_ns)
    }

    /// The policy driver changed `task`'s UX tags.
    pub fn ux_state_changed(&self, cpu: CpuId, task: &Task) {
        if let Err(err) = self.state.queues.ux_state_changed(cpu, task) {
            crate::kdebug!("sched_assist: pid {} ux state change: {}", task.pid, err);
        }
    }

    /// `place_entity`: give non-UX tasks on boosted-capacity clusters a
    /// vruntime credit according to their group.
    pub fn place_entity(&self, cfg: &AssistConfig, cpu: CpuId, task: &Task, initial: bool, vruntime: &mut u64) {
        let adjust = &cfg.group_adjust;
        let multiple = adjust
            .cap_multiple
            .get(self.topo.cluster_of(cpu))
            .copied()
            .unwrap_or(100);

        if !adjust.enabled || multiple <= 100 || initial || task.is_ux() {
            return;
        }

        let compensate = match task.group {
            GroupClass::Top => adjust.compensate[0],
            GroupClass::Foreground => adjust.compensate[1],
            GroupClass::Background => adjust.compensate[2],
            GroupClass::Default => adjust.compensate[3],
            GroupClass::Other => return,
        };

        let credit = adjust
            .std_vtime_slice_ns
            .saturating_mul(compensate)
            .saturating_mul(multiple)
            .min(*vruntime);
        *vruntime -= credit;

        if cfg.debug.contains(config::DebugFlags::EAS_OPT) {
            crate::ktrace!(
                "[eas_opt]: pid {} cpu {} group {:?} adjust {} vruntime {}",
                task.pid,
                cpu,
                task.group,
                credit,
                *vruntime
            );
        }
    }
}

// ============================================================================
// Global engine
// ============================================================================

static ENGINE: Once<Engine> = Once::new();

/// Install the process-wide engine. Fails if one is already installed.
pub fn install(engine: Engine) -> Result<&'static Engine, AssistError> {
    let mut fresh = false;
    let installed = ENGINE.call_once(|| {
        fresh = true;
        engine
    });
    if !fresh {
        crate::kerror!("sched_assist: engine already installed");
        return Err(AssistError::AlreadyInitialized);
    }
    crate::kinfo!(
        "sched_assist: engine installed ({} clusters)",
        installed.topo.nr_clusters()
    );
    Ok(installed)
}

pub fn engine() -> Option<&'static Engine> {
    ENGINE.get()
}

/// Vendor hook: should a UX task avoid `dst_cpu`?
pub fn should_ux_task_skip_cpu<E: SchedEnv + ?Sized>(env: &E, task: &Task, dst_cpu: CpuId) -> bool {
    let Some(engine) = engine() else {
        return false;
    };
    let cfg = config::global().snapshot();
    should_skip_cpu(&engine.ctx(env, &cfg), task, dst_cpu)
}

/// Vendor hook: move `target` to the preferred CPU of a UX task.
pub fn set_ux_task_to_prefer_cpu<E: SchedEnv + ?Sized>(
    env: &E,
    task: &Task,
    target: &mut Option<CpuId>,
) -> bool {
    let Some(engine) = engine() else {
        return false;
    };
    let cfg = config::global().snapshot();
    engine.select_task_rq(env, &cfg, task, target)
}

pub fn can_migrate_task<E: SchedEnv + ?Sized>(env: &E, task: &Task, dst_cpu: CpuId, can_migrate: &mut bool) {
    if let Some(engine) = engine() {
        let cfg = config::global().snapshot();
        engine.can_migrate_task(env, &cfg, task, dst_cpu, can_migrate);
    }
}

pub fn check_preempt_wakeup_fair<E: SchedEnv + ?Sized>(
    env: &E,
    cpu: CpuId,
    wake: &Task,
    preempt: &mut bool,
    nopreempt: &mut bool,
) {
    if let Some(engine) = engine() {
        let cfg = config::global().snapshot();
        engine.check_preempt_wakeup_fair(env, &cfg, cpu, wake, preempt, nopreempt);
    }
}

pub fn replace_next_task_fair<E: SchedEnv + ?Sized>(
    env: &E,
    cpu: CpuId,
    next: &mut Option<TaskId>,
    repick: &mut bool,
) {
    if let Some(engine) = engine() {
        let cfg = config::global().snapshot();
        engine.replace_next_task_fair(env, &cfg, cpu, next, repick);
    }
}

pub fn enqueue_entity(cpu: CpuId, task: &Task) {
    if let Some(engine) = engine() {
        let cfg = config::global().snapshot();
        engine.enqueue_entity(&cfg, cpu, task);
    }
}

pub fn dequeue_entity(cpu: CpuId, task: &Task) {
    if let Some(engine) = engine() {
        engine.dequeue_entity(cpu, task);
    }
}

pub fn update_deadline<E: SchedEnv + ?Sized>(env: &E, cpu: CpuId, skip_preempt: &mut bool) {
    if let Some(engine) = engine() {
        let cfg = config::global().snapshot();
        if engine.update_deadline(env, &cfg, cpu) {
            *skip_preempt = true;
        }
    }
}

pub fn place_entity(cpu: CpuId, task: &Task, initial: bool, vruntime: &mut u64) {
    if let Some(engine) = engine() {
        let cfg = config::global().snapshot();
        engine.place_entity(&cfg, cpu, task, initial, vruntime);
    }
}

pub fn should_ux_task_skip_eas(task: &Task) -> bool {
    classify::should_ux_task_skip_eas(task, &config::global().snapshot())
}

pub fn cpu_halted(cpu: CpuId) -> bool {
    classify::cpu_halted(&config::global().snapshot(), cpu)
}

/// Preemption outcome as an enum, for callers that do not use flags.
pub fn wakeup_decision<E: SchedEnv + ?Sized>(env: &E, cpu: CpuId, wake: &Task) -> PreemptDecision {
    let (mut preempt, mut nopreempt) = (false, false);
    check_preempt_wakeup_fair(env, cpu, wake, &mut preempt, &mut nopreempt);
    PreemptDecision::from_flags(preempt, nopreempt)
}
