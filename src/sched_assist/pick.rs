//! Replace-next-task override
//!
//! When the fair class is about to pick, a valid UX task waiting in the
//! CPU's UX queue takes the CPU instead. Entries that went stale (task moved
//! to another CPU, lost its UX tags, or exited) are dropped on the way.

use crate::logger::RateLimit;

use super::env::{AssistCtx, SchedEnv};
use super::types::{CpuId, TaskId};

static STALE_WARN: RateLimit = RateLimit::default_limits();

#[derive(Default)]
struct Stale {
    wrong_cpu: u64,
    not_ux: u64,
    gone: u64,
    first_wrong: Option<(u32, CpuId)>,
}

/// Earliest valid UX task queued on `cpu`, if any.
pub fn replace_next_task<E: SchedEnv + ?Sized>(ctx: &AssistCtx<'_, E>, cpu: CpuId) -> Option<TaskId> {
    if !ctx.cfg.enabled || ctx.cfg.ext_sched_active {
        return None;
    }
    if !ctx.queues.has_ux_tasks(cpu) {
        return None;
    }

    let mut stale = Stale::default();
    let pick = ctx
        .queues
        .with_queue(cpu, |q| loop {
            let entry = *q.leftmost()?;
            match ctx.task(entry.task) {
                None => stale.gone += 1,
                Some(task) if task.cpu != cpu => {
                    stale.wrong_cpu += 1;
                    stale.first_wrong.get_or_insert((task.pid, task.cpu));
                }
                Some(task) if !task.is_ux() => stale.not_ux += 1,
                Some(_) => return Some(entry.task),
            }
            q.remove(entry.task);
        })
        .flatten();

    // Report outside the queue lock
    if stale.wrong_cpu + stale.not_ux + stale.gone > 0 {
        ctx.stats.record_stale(stale.wrong_cpu, stale.not_ux, stale.gone);
        if let Some((pid, task_cpu)) = stale.first_wrong {
            let now = ctx.cpu_rq(cpu).map_or(0, |rq| rq.clock_ns);
            crate::kwarn_ratelimited!(
                STALE_WARN,
                now,
                "sched_assist: cpu{} ux queue held pid {} of cpu{}",
                cpu,
                pid,
                task_cpu
            );
        }
    }

    if pick.is_some() {
        ctx.stats.record_replace_pick();
    }
    pick
}
