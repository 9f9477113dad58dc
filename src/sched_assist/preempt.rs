//! Wakeup preemption decision
//!
//! UX beats non-UX, non-UX never interrupts UX, and between two UX tasks the
//! CPU's UX queue order decides. Neither side UX is left to the deadline
//! collaborators.
//!
//! The UX queue lock is the only lock taken here, and no collaborator is
//! called while it is held.

use super::collab::PreemptDecision;
use super::env::{AssistCtx, SchedEnv};
use super::types::{CpuId, Task};

/// Should `wake`, just made runnable on `cpu`, preempt the running task?
pub fn check_preempt_wakeup<E: SchedEnv + ?Sized>(
    ctx: &AssistCtx<'_, E>,
    cpu: CpuId,
    wake: &Task,
) -> PreemptDecision {
    if !ctx.cfg.enabled {
        return PreemptDecision::Unset;
    }

    let curr = ctx.curr_task(cpu);
    let wake_ux = wake.is_ux();
    let curr_ux = curr.map_or(false, |c| c.is_ux());

    let decision = match (wake_ux, curr_ux) {
        (false, false) => return ctx.collab.deadline.check_preempt(cpu, wake, curr),
        (true, false) => PreemptDecision::Preempt,
        (false, true) => PreemptDecision::NoPreempt,
        (true, true) => {
            let Some(curr) = curr else {
                return PreemptDecision::Unset;
            };
            let gran = ctx.cfg.wakeup_gran_ns;
            let verdict = ctx
                .queues
                .with_queue(cpu, |q| {
                    q.contains(curr.id)
                        .then(|| q.need_wakeup_preempt(curr.id, gran))
                })
                .flatten();
            match verdict {
                Some(true) => PreemptDecision::Preempt,
                Some(false) => PreemptDecision::NoPreempt,
                // Running task not tracked: defer to the kernel
                None => return PreemptDecision::Unset,
            }
        }
    };

    ctx.stats
        .record_preempt(decision == PreemptDecision::Preempt);
    decision
}
