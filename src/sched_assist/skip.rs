//! Skip-CPU filter
//!
//! Fast veto consulted for every migration candidate the load balancer
//! evaluates. O(1) apart from the collaborator chain: no search, no locks.

use super::classify::{is_ux_task_prefer_cpu_for_scene, skip_rt_and_ux};
use super::env::{AssistCtx, SchedEnv};
use super::types::{CpuId, ImFlags, Task};

/// Why a UX task rejected a CPU
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Below the task's preferred cluster
    Cluster,
    /// RT tasks runnable there
    Rt,
    /// Other UX tasks queued there
    Ux,
}

impl SkipReason {
    pub const fn code(self) -> u8 {
        match self {
            SkipReason::Cluster => 0,
            SkipReason::Rt => 1,
            SkipReason::Ux => 2,
        }
    }
}

/// UX-specific rejection reason for `dst_cpu`, if any.
pub fn ux_skip_reason<E: SchedEnv + ?Sized>(
    ctx: &AssistCtx<'_, E>,
    task: &Task,
    dst_cpu: CpuId,
) -> Option<SkipReason> {
    let rq = ctx.cpu_rq(dst_cpu)?;

    if !is_ux_task_prefer_cpu_for_scene(task, rq, ctx.topo, ctx.cfg) {
        return Some(SkipReason::Cluster);
    }

    if skip_rt_and_ux(task, ctx.cfg) {
        if rq.rt_nr_running > 0 {
            return Some(SkipReason::Rt);
        }
        // Camera HAL threads are numerous; making them avoid each other
        // pushes them onto the biggest cores.
        if task.im_flags.contains(ImFlags::CAMERA_HAL) {
            return None;
        }
        if ctx.queues.has_ux_tasks(dst_cpu) {
            return Some(SkipReason::Ux);
        }
    }

    None
}

/// Must `dst_cpu` be rejected for `task`?
pub fn should_skip_cpu<E: SchedEnv + ?Sized>(ctx: &AssistCtx<'_, E>, task: &Task, dst_cpu: CpuId) -> bool {
    if !ctx.cfg.enabled {
        return false;
    }

    // Pipeline tasks are special whether or not they are UX
    if ctx.collab.pipeline.try_veto(task, dst_cpu) == Some(true) {
        ctx.stats.record_pipeline_skip();
        return true;
    }

    if !task.is_ux() {
        return false;
    }

    let Some(reason) = ux_skip_reason(ctx, task, dst_cpu) else {
        return false;
    };

    ctx.stats.record_skip(reason);
    if ctx.cfg.ftrace() {
        crate::ktrace!(
            "ux task pid={} tgid={} skip_cpu={} reason={}",
            task.pid,
            task.tgid,
            dst_cpu,
            reason.code()
        );
    }
    true
}
