//! Candidate CPU search for UX tasks
//!
//! Walks capacity clusters starting from the task's scene-preferred one and
//! scores every eligible CPU in a single pass per cluster:
//!
//! - idle CPUs, by shallowest idle state then lowest cumulative utilization
//! - busy CPUs not running UX, RT or VIP work and with no UX queued, by
//!   spare capacity
//!
//! A round that finds either returns immediately. When every round comes up
//! empty the search falls back, in order, to a CPU running a VIP task, a CPU
//! running RT work (or, for a strict UX task, the last CPU scanned in the
//! first round), the CPU with the most spare capacity regardless of
//! occupancy, and the CPU with the fewest queued UX tasks.
//!
//! CPUs with RT tasks waiting behind the running one are never candidates.

use super::classify::{
    is_ux_task_prefer_cpu_for_scene, preferred_cluster_for_scene, strict_ux_task, task_fits_max,
};
use super::env::{AssistCtx, SchedEnv};
use super::stats::TraceRecord;
use super::topology::ClusterWalk;
use super::types::{CpuId, CpuMask, CpuRq, Task, MAX_CPUS};
use super::util::{cpu_util_cum, idle_exit_latency, is_idle_cpu, spare_capacity};

/// Which decision tier produced a placement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementTier {
    Idle,
    SpareCap,
    Vip,
    Subopt,
    SpareSub,
    NrCpu,
}

impl PlacementTier {
    pub const COUNT: usize = 6;

    pub const fn index(self) -> usize {
        match self {
            PlacementTier::Idle => 0,
            PlacementTier::SpareCap => 1,
            PlacementTier::Vip => 2,
            PlacementTier::Subopt => 3,
            PlacementTier::SpareSub => 4,
            PlacementTier::NrCpu => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PlacementTier::Idle => "idle",
            PlacementTier::SpareCap => "spare_cap",
            PlacementTier::Vip => "vip",
            PlacementTier::Subopt => "subopt",
            PlacementTier::SpareSub => "spare_sub",
            PlacementTier::NrCpu => "nr_cpu",
        }
    }
}

/// Result of a successful search
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub cpu: CpuId,
    pub tier: PlacementTier,
    pub start_cluster: usize,
    /// Cluster of the last round searched
    pub final_cluster: usize,
    /// Eligible CPUs of the last round searched
    pub search_mask: CpuMask,
}

/// Best CPUs seen so far across all rounds
struct Candidates {
    /// (cpu, exit latency, cumulative util)
    idle: Option<(CpuId, u32, u64)>,
    max_spare: Option<(CpuId, u64)>,
    vip: Option<(CpuId, u64)>,
    rt_spare: Option<u64>,
    subopt: Option<CpuId>,
    /// Needs strictly positive spare capacity
    max_subopt: Option<(CpuId, u64)>,
    least_nr: Option<(CpuId, u32)>,
}

impl Candidates {
    const fn new() -> Self {
        Self {
            idle: None,
            max_spare: None,
            vip: None,
            rt_spare: None,
            subopt: None,
            max_subopt: None,
            least_nr: None,
        }
    }

    /// Strictly better idle CPU replaces the current best; full ties keep
    /// the first one seen.
    fn offer_idle(&mut self, cpu: CpuId, latency: u32, cum_util: u64) {
        let better = match self.idle {
            None => true,
            Some((_, best_lat, best_util)) => {
                latency < best_lat || (latency == best_lat && cum_util < best_util)
            }
        };
        if better {
            self.idle = Some((cpu, latency, cum_util));
        }
    }
}

#[inline]
fn more_spare(slot: Option<(CpuId, u64)>, spare: u64) -> bool {
    slot.map_or(true, |(_, best)| spare > best)
}

/// RT tasks queued behind the running one
fn rt_waiting(rq: &CpuRq, curr: Option<&Task>) -> u32 {
    let running_rt = curr.map_or(false, |c| c.is_rt());
    rq.rt_nr_running.saturating_sub(running_rt as u32)
}

/// The default target is already good enough: no UX running or queued, no
/// RT runnable, strong enough for the scene, not running a VIP task.
pub fn target_fastpath<E: SchedEnv + ?Sized>(ctx: &AssistCtx<'_, E>, task: &Task, target: CpuId) -> bool {
    let Some(rq) = ctx.cpu_rq(target) else {
        return false;
    };
    let curr = ctx.curr_task(target);

    if curr.map_or(false, |c| c.is_ux()) {
        return false;
    }
    if ctx.queues.has_ux_tasks(target) {
        return false;
    }
    if rq.rt_nr_running > 0 {
        return false;
    }
    if !is_ux_task_prefer_cpu_for_scene(task, rq, ctx.topo, ctx.cfg) {
        return false;
    }
    !curr.map_or(false, |c| c.vip)
}

/// Score every CPU of one cluster round.
fn scan_cluster<E: SchedEnv + ?Sized>(
    ctx: &AssistCtx<'_, E>,
    task: &Task,
    cluster: usize,
    mask: CpuMask,
    cluster_boost: bool,
    track_strict: bool,
    best: &mut Candidates,
) {
    for cpu in mask.iter_set() {
        let Some(rq) = ctx.cpu_rq(cpu) else {
            continue;
        };

        if ctx.collab.pipeline.try_veto(task, cpu) == Some(true) {
            continue;
        }

        // The weakest cluster is categorically unsuitable for a task that
        // does not fit it or that the scene boosts upward.
        if cluster == 0 && (cluster_boost || !task_fits_max(task, rq, ctx.cfg)) {
            break;
        }

        if is_idle_cpu(rq) {
            best.offer_idle(cpu, idle_exit_latency(rq), cpu_util_cum(rq, ctx.cfg));
            continue;
        }

        // Once an idle CPU is known only idle CPUs matter
        if best.idle.is_some() {
            continue;
        }

        let curr = ctx.curr_task(cpu);
        if rt_waiting(rq, curr) > 0 {
            continue;
        }

        let spare = spare_capacity(ctx.env, ctx.cfg, cpu, task);
        if spare > 0 && more_spare(best.max_subopt, spare) {
            best.max_subopt = Some((cpu, spare));
        }

        let nr = ctx.queues.nr_running(cpu);
        if best.least_nr.map_or(true, |(_, least)| nr < least) {
            best.least_nr = Some((cpu, nr));
        }

        if track_strict {
            best.subopt = Some(cpu);
        }

        if curr.map_or(false, |c| c.is_ux()) || ctx.queues.has_ux_tasks(cpu) {
            continue;
        }

        if curr.map_or(false, |c| c.is_rt()) {
            if best.rt_spare.map_or(true, |s| spare > s) {
                best.rt_spare = Some(spare);
                best.subopt = Some(cpu);
            }
            continue;
        }

        if curr.map_or(false, |c| c.vip) {
            if more_spare(best.vip, spare) {
                best.vip = Some((cpu, spare));
            }
            continue;
        }

        if more_spare(best.max_spare, spare) {
            best.max_spare = Some((cpu, spare));
        }
    }
}

/// Pick a CPU for a UX task, or `None` to keep `default_target`.
pub fn select_ux_cpu<E: SchedEnv + ?Sized>(
    ctx: &AssistCtx<'_, E>,
    task: &Task,
    default_target: Option<CpuId>,
) -> Option<Placement> {
    let cfg = ctx.cfg;
    let topo = ctx.topo;

    if !cfg.enabled || topo.nr_clusters() <= 1 || !task.is_ux() {
        return None;
    }

    let mut orig_cluster = 0;
    if let Some(target) = default_target.filter(|&cpu| cpu < MAX_CPUS) {
        orig_cluster = topo.cluster_of(target);
        if target_fastpath(ctx, task, target) {
            ctx.stats.record_fastpath();
            return None;
        }
    }

    let preferred = preferred_cluster_for_scene(task, topo, cfg);
    let cluster_boost = preferred > 0;
    // Never start below the cluster the task was already headed for
    let start = preferred.max(orig_cluster);

    let allowed = task
        .cpus_allowed
        .and(ctx.env.active_mask())
        .andnot(cfg.halt_mask);
    let strict = strict_ux_task(task, cfg) && !cfg.silver_perf_core;

    let mut best = Candidates::new();
    let mut final_cluster = start;
    let mut search_mask = CpuMask::empty();

    let walk = ClusterWalk::new(start, topo.nr_clusters(), cfg.lowend_plat_opt);
    for (round, cluster) in walk.enumerate() {
        final_cluster = cluster;
        search_mask = allowed.and(topo.cluster_mask(cluster));

        scan_cluster(ctx, task, cluster, search_mask, cluster_boost, strict && round == 0, &mut best);

        let hit = best
            .idle
            .map(|(cpu, ..)| (cpu, PlacementTier::Idle))
            .or(best.max_spare.map(|(cpu, _)| (cpu, PlacementTier::SpareCap)));
        if let Some((cpu, tier)) = hit {
            return Some(finish(ctx, task, default_target, cpu, tier, start, final_cluster, search_mask));
        }
    }

    let fallback = best
        .vip
        .map(|(cpu, _)| (cpu, PlacementTier::Vip))
        .or(best.subopt.map(|cpu| (cpu, PlacementTier::Subopt)))
        .or(best.max_subopt.map(|(cpu, _)| (cpu, PlacementTier::SpareSub)))
        .or(best.least_nr.map(|(cpu, _)| (cpu, PlacementTier::NrCpu)));

    match fallback {
        Some((cpu, tier)) => Some(finish(ctx, task, default_target, cpu, tier, start, final_cluster, search_mask)),
        None => {
            ctx.stats.record_no_candidate();
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn finish<E: SchedEnv + ?Sized>(
    ctx: &AssistCtx<'_, E>,
    task: &Task,
    orig_cpu: Option<CpuId>,
    cpu: CpuId,
    tier: PlacementTier,
    start_cluster: usize,
    final_cluster: usize,
    search_mask: CpuMask,
) -> Placement {
    ctx.stats.record_placement(tier);

    crate::ktrace!(
        "ux task={} tier={} orig_cpu={:?} cpu={} start_cls={} final_cls={} mask={:#x}",
        task.pid,
        tier.as_str(),
        orig_cpu,
        cpu,
        start_cluster,
        final_cluster,
        search_mask.bits()
    );
    if cfg!(feature = "debug_verbose") {
        crate::kdebug!("sched_assist: pid {} -> cpu{} via {}", task.pid, cpu, tier.as_str());
    }

    if ctx.cfg.ftrace() {
        ctx.stats.trace.push(TraceRecord {
            pid: task.pid,
            tier,
            orig_cpu,
            cpu,
            start_cluster,
            final_cluster,
            search_mask,
        });
    }

    Placement {
        cpu,
        tier,
        start_cluster,
        final_cluster,
        search_mask,
    }
}

/// Hook-shaped search: updates `target` and returns true when a better CPU
/// was found; otherwise leaves `target` untouched.
pub fn pick_cpu_for_ux_task<E: SchedEnv + ?Sized>(
    ctx: &AssistCtx<'_, E>,
    task: &Task,
    target: &mut Option<CpuId>,
) -> bool {
    match select_ux_cpu(ctx, task, *target) {
        Some(placement) => {
            *target = Some(placement.cpu);
            true
        }
        None => false,
    }
}
