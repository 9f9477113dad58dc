//! Test fixtures
//!
//! Synthetic machines: a cluster topology, per-CPU run-queue counters and a
//! task arena, plus an engine and a configuration snapshot to run the
//! policy against. Nothing here touches the global engine or publisher.


pub use collab::{leak, DeadlineStub, Event, EventLog, LockingStub, MigrationVeto, PipelineVeto};

use std::io::{self, Write};

use spin::Mutex;

use sched_assist::{
    AssistConfig, AssistCtx, ClusterTopology, CollabRole, Collaborator, CpuId, Engine, EngineState,
    Machine, SchedEnv, Task, TaskId, UxType,
};

static CAPTURED: Mutex<Vec<u8>> = Mutex::new(Vec::new());

/// Log sink that keeps a copy of every line for later inspection.
struct Capture;

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        CAPTURED.lock().extend_from_slice(buf);
        eprint!("{}", String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route library log records to the test harness and the capture buffer.
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Trace)
        .target(env_logger::Target::Pipe(Box::new(Capture)))
        .try_init();
}

/// Everything logged so far by any test.
pub fn captured_logs() -> String {
    String::from_utf8_lossy(&CAPTURED.lock()).into_owned()
}

/// Per-CPU state for a fresh engine. Leaked: engines borrow it for `'static`.
pub fn engine_state() -> &'static EngineState {
    Box::leak(Box::new(EngineState::new()))
}

/// 8 CPUs: 0-3 little (400), 4-6 mid (800), 7 prime (1024)
pub const THREE_CLUSTERS: &[(CpuId, CpuId, u64)] = &[(0, 3, 400), (4, 6, 800), (7, 7, 1024)];

/// 8 CPUs: 0-3 little (512), 4-7 big (1024)
pub const TWO_CLUSTERS: &[(CpuId, CpuId, u64)] = &[(0, 3, 512), (4, 7, 1024)];

pub struct Fixture {
    pub machine: Box<Machine>,
    pub engine: Engine,
    pub cfg: AssistConfig,
    next_pid: u32,
}

impl Fixture {
    /// Machine covering every CPU of `ranges`, all idle, capacities taken
    /// from the cluster each CPU belongs to.
    pub fn new(ranges: &[(CpuId, CpuId, u64)]) -> Self {
        init_logging();
        let topo = ClusterTopology::from_ranges(ranges).expect("valid topology");
        let nr_cpus = ranges.iter().map(|&(_, last, _)| last + 1).max().unwrap_or(1);

        let mut machine = Box::new(Machine::new(nr_cpus));
        for &(first, last, capacity) in ranges {
            for cpu in first..=last {
                let rq = machine.cpu_mut(cpu).expect("cpu in range");
                rq.capacity_orig = capacity;
                rq.cpu_capacity = capacity;
            }
        }

        Self {
            machine,
            engine: Engine::new(topo, engine_state()),
            cfg: AssistConfig::new(),
            next_pid: 1000,
        }
    }

    pub fn three_clusters() -> Self {
        Self::new(THREE_CLUSTERS)
    }

    pub fn two_clusters() -> Self {
        Self::new(TWO_CLUSTERS)
    }

    pub fn ctx(&self) -> AssistCtx<'_, Machine> {
        self.engine.ctx(&*self.machine, &self.cfg)
    }

    pub fn register(&mut self, role: CollabRole, priority: u8, collaborator: &'static dyn Collaborator) {
        self.engine
            .register(role, priority, collaborator)
            .expect("chain has room");
    }

    fn fresh_pid(&mut self) -> u32 {
        self.next_pid += 1;
        self.next_pid
    }

    /// Task of its own thread group (a main thread) carrying `ux`.
    pub fn ux_task(&self, ux: UxType) -> Task {
        let mut task = Task::new(500, 500);
        task.ux_state = ux;
        task.util_avg = 50;
        task.last_update_time = 1;
        task
    }

    /// A non-main thread carrying `ux`.
    pub fn ux_thread(&self, ux: UxType) -> Task {
        let mut task = self.ux_task(ux);
        task.pid = 501;
        task
    }

    pub fn spawn(&mut self, task: Task) -> TaskId {
        self.machine.spawn(task).expect("arena has room")
    }

    /// Run a plain CFS task on `cpu` and set the CPU's utilization.
    pub fn busy(&mut self, cpu: CpuId, util: u64) -> TaskId {
        let pid = self.fresh_pid();
        let mut task = Task::new(pid, pid);
        task.cpu = cpu;
        task.on_rq = true;
        self.run_on(cpu, task, util)
    }

    /// Run `task` on `cpu` and set the CPU's utilization.
    pub fn run_on(&mut self, cpu: CpuId, mut task: Task, util: u64) -> TaskId {
        task.cpu = cpu;
        let id = self.spawn(task);
        self.machine.set_curr(cpu, Some(id)).expect("cpu in range");
        let rq = self.machine.cpu_mut(cpu).expect("cpu in range");
        rq.util_avg = util;
        id
    }

    pub fn busy_rt(&mut self, cpu: CpuId, util: u64) -> TaskId {
        let pid = self.fresh_pid();
        let mut task = Task::new(pid, pid);
        task.prio = 50;
        self.run_on(cpu, task, util)
    }

    pub fn busy_vip(&mut self, cpu: CpuId, util: u64) -> TaskId {
        let pid = self.fresh_pid();
        let mut task = Task::new(pid, pid);
        task.vip = true;
        self.run_on(cpu, task, util)
    }

    pub fn busy_ux(&mut self, cpu: CpuId, util: u64) -> TaskId {
        let pid = self.fresh_pid();
        let mut task = Task::new(pid, pid);
        task.ux_state = UxType::LIGHT;
        self.run_on(cpu, task, util)
    }

    /// Leave `cpu` idle in a state with the given exit latency.
    pub fn idle(&mut self, cpu: CpuId, exit_latency: u32, util: u64) {
        self.machine.set_curr(cpu, None).expect("cpu in range");
        let rq = self.machine.cpu_mut(cpu).expect("cpu in range");
        rq.nr_running = 0;
        rq.idle_exit_latency = exit_latency;
        rq.util_avg = util;
    }

    /// Queue RT tasks behind whatever runs on `cpu`.
    pub fn queue_rt(&mut self, cpu: CpuId, count: u32) {
        let rq = self.machine.cpu_mut(cpu).expect("cpu in range");
        rq.rt_nr_running += count;
        rq.nr_running += count;
    }

    /// Queue a fresh runnable UX task on `cpu`, in both the run-queue count
    /// and the UX queue.
    pub fn queue_ux(&mut self, cpu: CpuId) -> TaskId {
        let pid = self.fresh_pid();
        let mut task = Task::new(pid, pid);
        task.ux_state = UxType::LIGHT;
        task.cpu = cpu;
        task.on_rq = true;
        let id = self.spawn(task);
        let task = *self.machine.task(id).expect("just spawned");
        self.machine.cpu_mut(cpu).expect("cpu in range").nr_running += 1;
        self.engine
            .queues()
            .enqueue_ux_task(cpu, &task)
            .expect("queue has room");
        id
    }

    /// Mark every CPU busy with a plain task at `util`.
    pub fn all_busy(&mut self, util: u64) {
        for cpu in 0..self.machine.nr_cpus() {
            self.busy(cpu, util);
        }
    }

    pub fn task(&self, id: TaskId) -> Task {
        *self.machine.task(id).expect("live task")
    }
}
