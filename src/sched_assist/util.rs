//! CPU utilization and spare capacity
//!
//! Estimates what a CPU's utilization would be right after a hypothetical
//! migration, following mainline EAS. Counters are read without locks; a
//! tick of staleness only skews a heuristic.

use super::classify::fit_capacity_of;
use super::config::AssistConfig;
use super::env::SchedEnv;
use super::types::{CpuId, CpuRq, Task};

#[inline]
pub fn task_util(task: &Task) -> u64 {
    task.util_avg
}

#[inline]
pub fn task_util_est(task: &Task) -> u64 {
    task.util_est
}

/// Utilization of `cpu` if `task` ran on `dst_cpu`.
///
/// With `dst_cpu == None` the task is treated as leaving `cpu`. With
/// `boost` the runnable average raises the figure to cover queued demand.
pub fn cpu_util<E: SchedEnv + ?Sized>(
    env: &E,
    cfg: &AssistConfig,
    cpu: CpuId,
    task: Option<&Task>,
    dst_cpu: Option<CpuId>,
    boost: bool,
) -> u64 {
    let Some(rq) = env.cpu_rq(cpu) else {
        return 0;
    };

    let mut util = rq.util_avg;
    if boost {
        util = util.max(rq.runnable_avg);
    }

    let leaving = task.filter(|p| p.cpu == cpu && dst_cpu != Some(cpu));
    let arriving = task.filter(|p| p.cpu != cpu && dst_cpu == Some(cpu));

    if let Some(p) = leaving {
        util = util.saturating_sub(task_util(p));
    } else if let Some(p) = arriving {
        util = util.saturating_add(task_util(p));
    }

    if cfg.util_est {
        let mut util_est = rq.util_est;
        if let Some(p) = leaving {
            // Only an enqueued (or running) task contributes to util_est
            if p.on_rq || env.current_task() == Some(p.id) {
                util_est = util_est.saturating_sub(task_util_est(p));
            }
        } else if let Some(p) = arriving {
            util_est = util_est.saturating_add(task_util_est(p));
        }
        util = util.max(util_est);
    }

    util.min(rq.capacity_orig)
}

/// Utilization of `cpu` without `task`'s contribution.
///
/// A task that is not on `cpu`, or has never been accounted, contributes
/// nothing to remove.
pub fn cpu_util_without<E: SchedEnv + ?Sized>(
    env: &E,
    cfg: &AssistConfig,
    cpu: CpuId,
    task: &Task,
) -> u64 {
    let task = if task.cpu != cpu || task.last_update_time == 0 {
        None
    } else {
        Some(task)
    };
    cpu_util(env, cfg, cpu, task, None, false)
}

/// Capacity left on `cpu` once `task` is taken out of it, never negative.
pub fn spare_capacity<E: SchedEnv + ?Sized>(
    env: &E,
    cfg: &AssistConfig,
    cpu: CpuId,
    task: &Task,
) -> u64 {
    let Some(rq) = env.cpu_rq(cpu) else {
        return 0;
    };
    fit_capacity_of(rq, cfg).saturating_sub(cpu_util_without(env, cfg, cpu, task))
}

/// Cumulative utilization, the idle tie-break metric.
#[inline]
pub fn cpu_util_cum(rq: &CpuRq, cfg: &AssistConfig) -> u64 {
    let mut util = rq.util_avg;
    if cfg.util_est {
        util = util.max(rq.util_est);
    }
    util.min(rq.capacity_orig)
}

/// Idle task running, nothing queued, no remote wakeup in flight.
#[inline]
pub fn is_idle_cpu(rq: &CpuRq) -> bool {
    rq.curr.is_none() && rq.nr_running == 0 && !rq.ttwu_pending
}

/// Exit latency of the CPU's idle state, 0 if it is not idle.
#[inline]
pub fn idle_exit_latency(rq: &CpuRq) -> u32 {
    if rq.curr.is_none() {
        rq.idle_exit_latency
    } else {
        0
    }
}
