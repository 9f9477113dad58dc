//! Per-CPU UX run-queues
//!
//! Each CPU keeps an ordered index of its runnable UX tasks. Entries are
//! handles into the host's task storage and never own a task. The order key
//! is `(ux_priority, vruntime, seq)`: more urgent tasks first, then the UX
//! timeline, then insertion order.
//!
//! ## Locking
//!
//! The per-CPU queue lock is a leaf lock. It is taken with interrupts
//! masked (through [`IrqControl`]) and only inside [`UxRunQueues::with_queue`],
//! whose closure sees nothing but the queue itself: collaborator hooks and
//! logging happen before or after, never while it is held. At most one
//! queue lock is held at a time.
//!
//! The number of queued UX tasks per CPU is mirrored in an atomic so the
//! search and skip paths can test other CPUs without locking them.

use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use super::env::{IrqControl, NoIrqControl};
use super::error::AssistError;
use super::types::{calc_delta_vruntime, nice_to_weight, CpuId, Task, TaskId, MAX_CPUS, UX_RQ_SIZE};

/// One queued UX task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UxEntry {
    pub task: TaskId,
    pub ux_priority: u8,
    pub vruntime: u64,
    pub seq: u64,
    pub nice: i8,
}

impl UxEntry {
    #[inline]
    fn key(&self) -> (u8, u64, u64) {
        (self.ux_priority, self.vruntime, self.seq)
    }
}

/// Ordered UX queue of one CPU.
pub struct UxRunQueue {
    entries: [Option<UxEntry>; UX_RQ_SIZE],
    count: usize,
    cpu: CpuId,
    /// Monotonic floor of the UX timeline
    min_vruntime: u64,
    next_seq: u64,
}

impl UxRunQueue {
    pub const fn new(cpu: CpuId) -> Self {
        Self {
            entries: [None; UX_RQ_SIZE],
            count: 0,
            cpu,
            min_vruntime: 0,
            next_seq: 0,
        }
    }

    #[inline]
    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn min_vruntime(&self) -> u64 {
        self.min_vruntime
    }

    /// Entries in queue order
    pub fn iter(&self) -> impl Iterator<Item = &UxEntry> {
        self.entries[..self.count].iter().filter_map(|e| e.as_ref())
    }

    /// Timeline-earliest entry
    #[inline]
    pub fn leftmost(&self) -> Option<&UxEntry> {
        self.entries[0].as_ref().filter(|_| self.count > 0)
    }

    fn position(&self, task: TaskId) -> Option<usize> {
        self.entries[..self.count]
            .iter()
            .position(|e| e.map_or(false, |e| e.task == task))
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.position(task).is_some()
    }

    pub fn entry(&self, task: TaskId) -> Option<&UxEntry> {
        let idx = self.position(task)?;
        self.entries[idx].as_ref()
    }

    /// Insert `task`, starting its timeline no earlier than the queue floor.
    pub fn insert(&mut self, task: &Task) -> Result<(), AssistError> {
        if self.contains(task.id) {
            return Err(AssistError::AlreadyQueued { cpu: self.cpu });
        }
        if self.count >= UX_RQ_SIZE {
            return Err(AssistError::UxQueueFull { cpu: self.cpu });
        }

        let entry = UxEntry {
            task: task.id,
            ux_priority: task.ux_priority,
            vruntime: self.min_vruntime,
            seq: self.next_seq,
            nice: task.nice,
        };
        self.next_seq += 1;
        self.insert_sorted(entry);
        Ok(())
    }

    fn insert_sorted(&mut self, entry: UxEntry) {
        // Find insertion point (maintain sorted order by key)
        let mut insert_idx = self.count;
        for i in 0..self.count {
            if let Some(existing) = &self.entries[i] {
                if entry.key() < existing.key() {
                    insert_idx = i;
                    break;
                }
            }
        }

        for i in (insert_idx..self.count).rev() {
            self.entries[i + 1] = self.entries[i];
        }
        self.entries[insert_idx] = Some(entry);
        self.count += 1;
    }

    pub fn remove(&mut self, task: TaskId) -> Option<UxEntry> {
        let idx = self.position(task)?;
        let entry = self.entries[idx].take();

        for i in idx..(self.count - 1) {
            self.entries[i] = self.entries[i + 1];
        }
        self.entries[self.count - 1] = None;
        self.count -= 1;
        self.update_min_vruntime();
        entry
    }

    /// Charge `delta_exec_ns` of runtime to a queued task and re-sort it.
    pub fn account_runtime(&mut self, task: TaskId, delta_exec_ns: u64) -> bool {
        let Some(mut entry) = self.remove(task) else {
            return false;
        };
        let delta = calc_delta_vruntime(delta_exec_ns, nice_to_weight(entry.nice));
        entry.vruntime = entry.vruntime.saturating_add(delta);
        self.insert_sorted(entry);
        self.update_min_vruntime();
        true
    }

    /// Does the queue's leftmost entry deserve the CPU more than `curr`?
    ///
    /// False when `curr` is itself leftmost or not queued. Otherwise true
    /// for a more urgent leftmost task, or one of equal urgency whose
    /// timeline trails `curr` by more than `gran_ns`.
    pub fn need_wakeup_preempt(&self, curr: TaskId, gran_ns: u64) -> bool {
        let (Some(left), Some(cur)) = (self.leftmost(), self.entry(curr)) else {
            return false;
        };
        if left.task == curr {
            return false;
        }
        if left.ux_priority != cur.ux_priority {
            return left.ux_priority < cur.ux_priority;
        }
        cur.vruntime > left.vruntime.saturating_add(gran_ns)
    }

    fn update_min_vruntime(&mut self) {
        let min = self.iter().map(|e| e.vruntime).min();
        // Only allow min_vruntime to increase
        if let Some(min) = min {
            if min > self.min_vruntime {
                self.min_vruntime = min;
            }
        }
    }
}

// ============================================================================
// Per-CPU state
// ============================================================================

#[repr(C, align(64))]
pub struct PerCpuUx {
    queue: Mutex<UxRunQueue>,
    /// Mirror of `queue.len()`, readable without the lock
    nr_running: AtomicU32,
}

impl PerCpuUx {
    pub const fn new(cpu: CpuId) -> Self {
        Self {
            queue: Mutex::new(UxRunQueue::new(cpu)),
            nr_running: AtomicU32::new(0),
        }
    }
}

/// All CPUs' UX queues.
pub struct UxRunQueues {
    cpus: [PerCpuUx; MAX_CPUS],
    irq: &'static dyn IrqControl,
}

impl UxRunQueues {
    pub const fn new() -> Self {
        Self::with_irq_control(&NoIrqControl)
    }

    pub const fn with_irq_control(irq: &'static dyn IrqControl) -> Self {
        let mut cpus = [const { PerCpuUx::new(0) }; MAX_CPUS];
        let mut cpu = 1;
        while cpu < MAX_CPUS {
            cpus[cpu] = PerCpuUx::new(cpu);
            cpu += 1;
        }
        Self { cpus, irq }
    }

    /// Queued UX tasks on `cpu`, lock-free snapshot
    #[inline]
    pub fn nr_running(&self, cpu: CpuId) -> u32 {
        self.cpus
            .get(cpu)
            .map_or(0, |pc| pc.nr_running.load(Ordering::Acquire))
    }

    #[inline]
    pub fn has_ux_tasks(&self, cpu: CpuId) -> bool {
        self.nr_running(cpu) > 0
    }

    /// Run `f` on `cpu`'s queue with the queue lock held and interrupts
    /// masked. Returns `None` for an out-of-range CPU.
    pub fn with_queue<R>(&self, cpu: CpuId, f: impl FnOnce(&mut UxRunQueue) -> R) -> Option<R> {
        let pc = self.cpus.get(cpu)?;
        let flags = self.irq.save();
        let result = {
            let mut queue = pc.queue.lock();
            let result = f(&mut *queue);
            pc.nr_running.store(queue.len() as u32, Ordering::Release);
            result
        };
        self.irq.restore(flags);
        Some(result)
    }

    /// CPU whose queue holds `task`, if any. Takes each lock in turn.
    pub fn locate(&self, task: TaskId) -> Option<CpuId> {
        (0..MAX_CPUS)
            .filter(|&cpu| self.has_ux_tasks(cpu))
            .find(|&cpu| self.with_queue(cpu, |q| q.contains(task)).unwrap_or(false))
    }

    pub fn is_queued_on(&self, cpu: CpuId, task: TaskId) -> bool {
        self.with_queue(cpu, |q| q.contains(task)).unwrap_or(false)
    }

    /// Add a runnable UX task to `cpu`'s queue. Non-UX tasks are ignored.
    ///
    /// A task lives in at most one queue; inserting it while it is queued
    /// elsewhere fails with `AlreadyQueued`. The membership scan and the
    /// insertion take different queue locks, so enqueues of one task must
    /// be serialized by the caller. The host does that already: a task is
    /// enqueued under its run-queue lock and wakeup lock.
    pub fn enqueue_ux_task(&self, cpu: CpuId, task: &Task) -> Result<(), AssistError> {
        if !task.is_ux() {
            return Ok(());
        }
        if cpu >= MAX_CPUS {
            return Err(AssistError::CpuOutOfRange(cpu));
        }
        if let Some(other) = self.locate(task.id) {
            return Err(AssistError::AlreadyQueued { cpu: other });
        }
        self.with_queue(cpu, |q| q.insert(task))
            .unwrap_or(Err(AssistError::CpuOutOfRange(cpu)))
    }

    /// Remove `task` from `cpu`'s queue; true if it was there.
    pub fn dequeue_ux_task(&self, cpu: CpuId, task: TaskId) -> bool {
        if !self.has_ux_tasks(cpu) {
            return false;
        }
        self.with_queue(cpu, |q| q.remove(task).is_some())
            .unwrap_or(false)
    }

    pub fn account_ux_runtime(&self, cpu: CpuId, task: TaskId, delta_exec_ns: u64) -> bool {
        self.with_queue(cpu, |q| q.account_runtime(task, delta_exec_ns))
            .unwrap_or(false)
    }

    /// Re-evaluate membership after the task's UX tags changed.
    pub fn ux_state_changed(&self, cpu: CpuId, task: &Task) -> Result<(), AssistError> {
        if task.is_ux() {
            if task.on_rq && !self.is_queued_on(cpu, task.id) {
                return self.enqueue_ux_task(cpu, task);
            }
        } else {
            self.dequeue_ux_task(cpu, task.id);
        }
        Ok(())
    }

    /// Copy of `cpu`'s queue order into `out`; returns the count written.
    pub fn snapshot(&self, cpu: CpuId, out: &mut [UxEntry]) -> usize {
        self.with_queue(cpu, |q| {
            let mut n = 0;
            for (slot, entry) in out.iter_mut().zip(q.iter()) {
                *slot = *entry;
                n += 1;
            }
            n
        })
        .unwrap_or(0)
    }
}

impl Default for UxRunQueues {
    fn default() -> Self {
        Self::new()
    }
}
