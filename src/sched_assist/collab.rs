//! Sibling-module collaborators
//!
//! Optional subsystems (pipeline priority, frame boost, locking protect,
//! deadline scheduling) register strategy objects at startup. Each capability
//! is consulted through an ordered chain that stops at the first definitive
//! answer; a subsystem that is absent simply never registers.

use super::error::AssistError;
use super::types::{CpuId, Task, TaskId};

/// Maximum collaborators per chain
pub const MAX_COLLABORATORS: usize = 8;

/// Outcome of a wakeup preemption check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PreemptDecision {
    /// Defer to the kernel's own decision
    #[default]
    Unset,
    Preempt,
    NoPreempt,
}

impl PreemptDecision {
    /// Read the hook's `(preempt, nopreempt)` out-parameters.
    pub fn from_flags(preempt: bool, nopreempt: bool) -> Self {
        if nopreempt {
            PreemptDecision::NoPreempt
        } else if preempt {
            PreemptDecision::Preempt
        } else {
            PreemptDecision::Unset
        }
    }

    /// Write into the hook's out-parameters; `Unset` leaves them alone.
    pub fn apply(self, preempt: &mut bool, nopreempt: &mut bool) {
        match self {
            PreemptDecision::Preempt => *preempt = true,
            PreemptDecision::NoPreempt => *nopreempt = true,
            PreemptDecision::Unset => {}
        }
    }

    #[inline]
    pub fn is_set(self) -> bool {
        self != PreemptDecision::Unset
    }
}

/// Capabilities a collaborator may provide. Every method defaults to "no
/// opinion", so an implementation overrides only what it handles.
pub trait Collaborator: Sync {
    fn name(&self) -> &'static str;

    /// Must `cpu` be rejected for `task`? `None` passes to the next link.
    fn try_veto(&self, _task: &Task, _cpu: CpuId) -> Option<bool> {
        None
    }

    /// Must migrating `task` from `src` to `dst` be refused?
    fn try_veto_migration(&self, _task: &Task, _src: CpuId, _dst: CpuId) -> Option<bool> {
        None
    }

    fn check_preempt(&self, _cpu: CpuId, _wake: &Task, _curr: Option<&Task>) -> PreemptDecision {
        PreemptDecision::Unset
    }

    /// Task to run next on `cpu` instead of the fair class's pick
    fn replace_next(&self, _cpu: CpuId) -> Option<TaskId> {
        None
    }

    fn on_enqueue(&self, _cpu: CpuId, _task: &Task) {}

    fn on_dequeue(&self, _cpu: CpuId, _task: &Task) {}
}

#[derive(Clone, Copy)]
struct ChainEntry {
    priority: u8,
    collaborator: &'static dyn Collaborator,
}

/// Collaborators ordered by ascending priority, stable for equal priority.
pub struct VetoChain {
    entries: [Option<ChainEntry>; MAX_COLLABORATORS],
    count: usize,
}

impl VetoChain {
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_COLLABORATORS],
            count: 0,
        }
    }

    pub fn register(
        &mut self,
        priority: u8,
        collaborator: &'static dyn Collaborator,
    ) -> Result<(), AssistError> {
        if self.count >= MAX_COLLABORATORS {
            return Err(AssistError::ChainFull);
        }

        let mut insert_idx = self.count;
        for i in 0..self.count {
            if let Some(existing) = &self.entries[i] {
                if priority < existing.priority {
                    insert_idx = i;
                    break;
                }
            }
        }
        for i in (insert_idx..self.count).rev() {
            self.entries[i + 1] = self.entries[i];
        }
        self.entries[insert_idx] = Some(ChainEntry {
            priority,
            collaborator,
        });
        self.count += 1;

        crate::kinfo!(
            "sched_assist: registered collaborator '{}' (priority {})",
            collaborator.name(),
            priority
        );
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static dyn Collaborator> + '_ {
        self.entries[..self.count]
            .iter()
            .filter_map(|e| e.map(|e| e.collaborator))
    }

    /// First definitive answer along the chain.
    pub fn first_verdict<T>(&self, mut ask: impl FnMut(&dyn Collaborator) -> Option<T>) -> Option<T> {
        self.iter().find_map(|c| ask(c))
    }

    pub fn try_veto(&self, task: &Task, cpu: CpuId) -> Option<bool> {
        self.first_verdict(|c| c.try_veto(task, cpu))
    }

    pub fn try_veto_migration(&self, task: &Task, src: CpuId, dst: CpuId) -> Option<bool> {
        self.first_verdict(|c| c.try_veto_migration(task, src, dst))
    }

    /// First collaborator that sets a decision wins.
    pub fn check_preempt(&self, cpu: CpuId, wake: &Task, curr: Option<&Task>) -> PreemptDecision {
        self.first_verdict(|c| Some(c.check_preempt(cpu, wake, curr)).filter(|d| d.is_set()))
            .unwrap_or_default()
    }

    pub fn replace_next(&self, cpu: CpuId) -> Option<TaskId> {
        self.first_verdict(|c| c.replace_next(cpu))
    }

    /// Observers see every event in chain order.
    pub fn notify_enqueue(&self, cpu: CpuId, task: &Task) {
        for c in self.iter() {
            c.on_enqueue(cpu, task);
        }
    }

    pub fn notify_dequeue(&self, cpu: CpuId, task: &Task) {
        for c in self.iter() {
            c.on_dequeue(cpu, task);
        }
    }
}

impl Default for VetoChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Role a collaborator is registered under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollabRole {
    /// Pipeline priority: skip-CPU veto for placement and migration
    Pipeline,
    /// Frame boost: migration veto after the skip filter allowed it
    FrameBoost,
    /// Locking protect: preemption first, pick-next after UX, entity events
    LockingProtect,
    /// Deadline scheduling: preemption between non-UX tasks, last pick-next
    Deadline,
}

/// Every registered chain, fixed after startup.
pub struct Collaborators {
    pub pipeline: VetoChain,
    pub frame_boost: VetoChain,
    pub locking_protect: VetoChain,
    pub deadline: VetoChain,
}

impl Collaborators {
    pub const fn new() -> Self {
        Self {
            pipeline: VetoChain::new(),
            frame_boost: VetoChain::new(),
            locking_protect: VetoChain::new(),
            deadline: VetoChain::new(),
        }
    }

    pub fn register(
        &mut self,
        role: CollabRole,
        priority: u8,
        collaborator: &'static dyn Collaborator,
    ) -> Result<(), AssistError> {
        self.chain_mut(role).register(priority, collaborator)
    }

    pub fn chain(&self, role: CollabRole) -> &VetoChain {
        match role {
            CollabRole::Pipeline => &self.pipeline,
            CollabRole::FrameBoost => &self.frame_boost,
            CollabRole::LockingProtect => &self.locking_protect,
            CollabRole::Deadline => &self.deadline,
        }
    }

    fn chain_mut(&mut self, role: CollabRole) -> &mut VetoChain {
        match role {
            CollabRole::Pipeline => &mut self.pipeline,
            CollabRole::FrameBoost => &mut self.frame_boost,
            CollabRole::LockingProtect => &mut self.locking_protect,
            CollabRole::Deadline => &mut self.deadline,
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new()
    }
}
