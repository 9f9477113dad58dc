//! Host scheduler view
//!
//! The policy never owns task or run-queue state. It reads both through
//! [`SchedEnv`], which the kernel glue implements over its own structures.
//! [`Machine`] is a self-contained implementation backed by fixed arrays,
//! used by simulation and by the test suite.

use super::collab::Collaborators;
use super::config::AssistConfig;
use super::error::AssistError;
use super::percpu::UxRunQueues;
use super::stats::AssistStats;
use super::topology::ClusterTopology;
use super::types::{CpuId, CpuMask, CpuRq, Task, TaskId, MAX_CPUS, MAX_TASKS};

/// Read-only view of the host scheduler.
pub trait SchedEnv {
    fn cpu_rq(&self, cpu: CpuId) -> Option<&CpuRq>;

    fn task(&self, id: TaskId) -> Option<&Task>;

    /// CPUs currently active (online and schedulable)
    fn active_mask(&self) -> CpuMask;

    /// Task running on the CPU executing the hook, if known
    fn current_task(&self) -> Option<TaskId> {
        None
    }

    /// Task currently running on `cpu`
    fn curr_task(&self, cpu: CpuId) -> Option<&Task> {
        self.cpu_rq(cpu)
            .and_then(|rq| rq.curr)
            .and_then(|id| self.task(id))
    }
}

/// Interrupt masking around the per-CPU UX queue lock.
///
/// The kernel glue maps this to `local_irq_save`/`local_irq_restore`.
pub trait IrqControl: Sync {
    fn save(&self) -> usize;
    fn restore(&self, flags: usize);
}

/// For hosts where hooks never run in interrupt context.
pub struct NoIrqControl;

impl IrqControl for NoIrqControl {
    #[inline]
    fn save(&self) -> usize {
        0
    }

    #[inline]
    fn restore(&self, _flags: usize) {}
}

/// Everything a decision function reads, bundled per call.
///
/// Holding one configuration snapshot for the whole call keeps each
/// decision consistent even if the publisher changes concurrently.
pub struct AssistCtx<'a, E: SchedEnv + ?Sized> {
    pub env: &'a E,
    pub cfg: &'a AssistConfig,
    pub topo: &'a ClusterTopology,
    pub queues: &'a UxRunQueues,
    pub collab: &'a Collaborators,
    pub stats: &'a AssistStats,
}

impl<'a, E: SchedEnv + ?Sized> AssistCtx<'a, E> {
    #[inline]
    pub fn cpu_rq(&self, cpu: CpuId) -> Option<&'a CpuRq> {
        self.env.cpu_rq(cpu)
    }

    #[inline]
    pub fn task(&self, id: TaskId) -> Option<&'a Task> {
        self.env.task(id)
    }

    #[inline]
    pub fn curr_task(&self, cpu: CpuId) -> Option<&'a Task> {
        self.env.curr_task(cpu)
    }
}

// ============================================================================
// Task arena
// ============================================================================

/// Fixed-capacity task storage with generation-checked handles.
pub struct TaskArena {
    slots: [Option<Task>; MAX_TASKS],
    generations: [u32; MAX_TASKS],
    count: usize,
}

impl TaskArena {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_TASKS],
            generations: [0; MAX_TASKS],
            count: 0,
        }
    }

    /// Store `task` and return its handle. `task.id` is overwritten.
    pub fn insert(&mut self, mut task: Task) -> Result<TaskId, AssistError> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(AssistError::ArenaFull)?;

        let id = TaskId::new(index as u32, self.generations[index]);
        task.id = id;
        self.slots[index] = Some(task);
        self.count += 1;
        Ok(id)
    }

    /// Drop the task; its handle goes stale.
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        self.get(id)?;
        let task = self.slots[id.index()].take();
        self.generations[id.index()] = self.generations[id.index()].wrapping_add(1);
        self.count -= 1;
        task
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.slots
            .get(id.index())?
            .as_ref()
            .filter(|task| task.id == id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.slots
            .get_mut(id.index())?
            .as_mut()
            .filter(|task| task.id == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }
}

impl Default for TaskArena {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Machine
// ============================================================================

/// Array-backed [`SchedEnv`]: per-CPU run-queue snapshots plus a task arena.
pub struct Machine {
    cpus: [CpuRq; MAX_CPUS],
    nr_cpus: usize,
    active: CpuMask,
    tasks: TaskArena,
    current: Option<TaskId>,
}

impl Machine {
    pub fn new(nr_cpus: usize) -> Self {
        let nr_cpus = nr_cpus.min(MAX_CPUS);
        Self {
            cpus: core::array::from_fn(CpuRq::new),
            nr_cpus,
            active: CpuMask::first_n(nr_cpus),
            tasks: TaskArena::new(),
            current: None,
        }
    }

    #[inline]
    pub fn nr_cpus(&self) -> usize {
        self.nr_cpus
    }

    pub fn cpu_mut(&mut self, cpu: CpuId) -> Option<&mut CpuRq> {
        if cpu < self.nr_cpus {
            Some(&mut self.cpus[cpu])
        } else {
            None
        }
    }

    pub fn set_active(&mut self, mask: CpuMask) {
        self.active = mask.and(CpuMask::first_n(self.nr_cpus));
    }

    pub fn set_current(&mut self, id: Option<TaskId>) {
        self.current = id;
    }

    pub fn tasks(&self) -> &TaskArena {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut TaskArena {
        &mut self.tasks
    }

    pub fn spawn(&mut self, task: Task) -> Result<TaskId, AssistError> {
        self.tasks.insert(task)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Make `id` the running task on `cpu`, `None` for idle.
    ///
    /// Keeps `nr_running` and the RT count consistent with the switch.
    pub fn set_curr(&mut self, cpu: CpuId, id: Option<TaskId>) -> Result<(), AssistError> {
        if cpu >= self.nr_cpus {
            return Err(AssistError::CpuOutOfRange(cpu));
        }
        let old_rt = self.cpus[cpu]
            .curr
            .and_then(|old| self.tasks.get(old))
            .map_or(false, |task| task.is_rt());
        let new_rt = id
            .and_then(|new| self.tasks.get(new))
            .map_or(false, |task| task.is_rt());

        let rq = &mut self.cpus[cpu];
        if rq.curr.is_none() && id.is_some() {
            rq.nr_running += 1;
        } else if rq.curr.is_some() && id.is_none() {
            rq.nr_running = rq.nr_running.saturating_sub(1);
        }
        if old_rt {
            rq.rt_nr_running = rq.rt_nr_running.saturating_sub(1);
        }
        if new_rt {
            rq.rt_nr_running += 1;
        }
        rq.curr = id;
        Ok(())
    }
}

impl SchedEnv for Machine {
    fn cpu_rq(&self, cpu: CpuId) -> Option<&CpuRq> {
        if cpu < self.nr_cpus {
            Some(&self.cpus[cpu])
        } else {
            None
        }
    }

    fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    fn active_mask(&self) -> CpuMask {
        self.active
    }

    fn current_task(&self) -> Option<TaskId> {
        self.current
    }
}
