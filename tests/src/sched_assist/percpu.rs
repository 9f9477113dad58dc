//! Per-CPU UX Queue Tests

use std::sync::atomic::{AtomicUsize, Ordering};

use sched_assist::percpu::{UxEntry, UxRunQueue, UxRunQueues};
use sched_assist::types::UX_RQ_SIZE;
use sched_assist::{AssistError, IrqControl, Task, TaskId, UxType};

fn ux_task(index: u32) -> Task {
    let mut task = Task::new(100 + index, 100 + index);
    task.id = TaskId::new(index, 0);
    task.ux_state = UxType::LIGHT;
    task.on_rq = true;
    task
}

struct CountingIrq {
    saves: AtomicUsize,
    restores: AtomicUsize,
}

impl IrqControl for CountingIrq {
    fn save(&self) -> usize {
        self.saves.fetch_add(1, Ordering::SeqCst)
    }

    fn restore(&self, _flags: usize) {
        self.restores.fetch_add(1, Ordering::SeqCst);
    }
}

static IRQ: CountingIrq = CountingIrq {
    saves: AtomicUsize::new(0),
    restores: AtomicUsize::new(0),
};

#[test]
fn test_queue_orders_by_priority_then_insertion() {
    let mut q = UxRunQueue::new(3);
    let mut urgent = ux_task(2);
    urgent.ux_priority = 0;
    q.insert(&ux_task(0)).unwrap();
    q.insert(&ux_task(1)).unwrap();
    q.insert(&urgent).unwrap();

    let order: Vec<TaskId> = q.iter().map(|e| e.task).collect();
    assert_eq!(order, vec![TaskId::new(2, 0), TaskId::new(0, 0), TaskId::new(1, 0)]);
    assert_eq!(q.cpu(), 3);
}

#[test]
fn test_queue_capacity() {
    let mut q = UxRunQueue::new(0);
    for i in 0..UX_RQ_SIZE as u32 {
        q.insert(&ux_task(i)).unwrap();
    }
    assert_eq!(q.len(), UX_RQ_SIZE);
    assert_eq!(
        q.insert(&ux_task(UX_RQ_SIZE as u32)),
        Err(AssistError::UxQueueFull { cpu: 0 })
    );
}

#[test]
fn test_min_vruntime_is_monotonic() {
    let mut q = UxRunQueue::new(0);
    let a = ux_task(0);
    let b = ux_task(1);
    q.insert(&a).unwrap();
    q.insert(&b).unwrap();

    q.account_runtime(a.id, 3_000_000);
    q.account_runtime(b.id, 5_000_000);
    assert_eq!(q.min_vruntime(), 3_000_000);

    // Removing the earliest task moves the floor up, never down
    q.remove(a.id);
    assert_eq!(q.min_vruntime(), 5_000_000);
    q.remove(b.id);
    assert_eq!(q.min_vruntime(), 5_000_000);

    // Newcomers start at the floor
    q.insert(&ux_task(2)).unwrap();
    assert_eq!(q.leftmost().map(|e| e.vruntime), Some(5_000_000));
}

#[test]
fn test_nice_scales_runtime() {
    let mut q = UxRunQueue::new(0);
    let mut niced = ux_task(0);
    niced.nice = 5;
    q.insert(&niced).unwrap();
    q.account_runtime(niced.id, 1_000_000);

    // weight 335 at nice 5
    assert_eq!(q.entry(niced.id).map(|e| e.vruntime), Some(1_000_000 * 1024 / 335));
}

#[test]
fn test_task_lives_in_one_queue() {
    let queues = UxRunQueues::new();
    let task = ux_task(1);

    queues.enqueue_ux_task(2, &task).unwrap();
    assert_eq!(queues.enqueue_ux_task(5, &task), Err(AssistError::AlreadyQueued { cpu: 2 }));
    assert_eq!(queues.enqueue_ux_task(2, &task), Err(AssistError::AlreadyQueued { cpu: 2 }));
    assert_eq!(queues.locate(task.id), Some(2));
    assert_eq!(queues.nr_running(2), 1);
    assert_eq!(queues.nr_running(5), 0);

    assert!(queues.dequeue_ux_task(2, task.id));
    assert!(!queues.dequeue_ux_task(2, task.id));
    assert_eq!(queues.locate(task.id), None);
    assert!(!queues.has_ux_tasks(2));
}

#[test]
fn test_task_moves_between_queues() {
    static QUEUES: UxRunQueues = UxRunQueues::new();
    let task = ux_task(3);

    // Migration as the host serializes it: dequeue, then enqueue elsewhere
    QUEUES.enqueue_ux_task(2, &task).unwrap();
    assert!(QUEUES.dequeue_ux_task(2, task.id));
    QUEUES.enqueue_ux_task(5, &task).unwrap();

    assert_eq!(QUEUES.locate(task.id), Some(5));
    assert_eq!((QUEUES.nr_running(2), QUEUES.nr_running(5)), (0, 1));
    assert!(QUEUES.is_queued_on(5, task.id));
    assert!(QUEUES.dequeue_ux_task(5, task.id));
}

#[test]
fn test_non_ux_and_out_of_range() {
    let queues = UxRunQueues::new();
    let plain = Task::new(1, 1);
    queues.enqueue_ux_task(0, &plain).unwrap();
    assert!(!queues.has_ux_tasks(0));

    assert_eq!(
        queues.enqueue_ux_task(99, &ux_task(0)),
        Err(AssistError::CpuOutOfRange(99))
    );
    assert_eq!(queues.nr_running(99), 0);
    assert!(queues.with_queue(99, |q| q.len()).is_none());
}

#[test]
fn test_ux_state_change_updates_membership() {
    let queues = UxRunQueues::new();
    let mut task = ux_task(4);

    queues.ux_state_changed(1, &task).unwrap();
    assert!(queues.is_queued_on(1, task.id));

    task.ux_state = UxType::empty();
    queues.ux_state_changed(1, &task).unwrap();
    assert!(!queues.is_queued_on(1, task.id));

    // Sleeping task gains UX tags: nothing to queue yet
    task.ux_state = UxType::HEAVY;
    task.on_rq = false;
    queues.ux_state_changed(1, &task).unwrap();
    assert!(!queues.has_ux_tasks(1));
}

#[test]
fn test_snapshot_copies_queue_order() {
    let queues = UxRunQueues::new();
    for i in 0..3 {
        queues.enqueue_ux_task(6, &ux_task(i)).unwrap();
    }
    let mut out = [UxEntry {
        task: TaskId::new(0, 0),
        ux_priority: 0,
        vruntime: 0,
        seq: 0,
        nice: 0,
    }; 2];

    assert_eq!(queues.snapshot(6, &mut out), 2);
    assert_eq!(out[0].task, TaskId::new(0, 0));
    assert_eq!(out[1].task, TaskId::new(1, 0));
}

#[test]
fn test_queue_lock_masks_interrupts() {
    let queues = UxRunQueues::with_irq_control(&IRQ);
    let before = IRQ.saves.load(Ordering::SeqCst);

    queues.enqueue_ux_task(0, &ux_task(0)).unwrap();
    queues.account_ux_runtime(0, TaskId::new(0, 0), 1000);

    let saves = IRQ.saves.load(Ordering::SeqCst) - before;
    assert!(saves >= 2);
    assert_eq!(IRQ.saves.load(Ordering::SeqCst), IRQ.restores.load(Ordering::SeqCst));
}
