//! Core types for UX task placement

use bitflags::bitflags;

/// Maximum CPUs supported
pub const MAX_CPUS: usize = 64;

/// Maximum capacity clusters (little / mid / big / prime)
pub const MAX_CLUSTERS: usize = 4;

/// Capacity of the strongest CPU in the system
pub const SCHED_CAPACITY_SCALE: u64 = 1024;

/// Priorities below this are real-time
pub const MAX_RT_PRIO: i32 = 100;

/// Weight of a nice-0 task
pub const NICE_0_WEIGHT: u64 = 1024;

/// UX entries per CPU
pub const UX_RQ_SIZE: usize = 64;

/// Task slots in [`super::env::TaskArena`]
pub const MAX_TASKS: usize = 256;

/// Default ux priority assigned to UX tasks with no explicit one
pub const DEFAULT_UX_PRIORITY: u8 = 4;

/// Utilization above which an animator task is boosted to the mid cluster
pub const BOOST_THRESHOLD_UNIT: u64 = 51;

/// Default UX wakeup preemption granularity
pub const UX_WAKEUP_GRAN_NS: u64 = 1_000_000;

pub type CpuId = usize;

/// Nice to weight table (same as Linux sched_prio_to_weight)
const NICE_TO_WEIGHT: [u64; 40] = [
    88761, 71755, 56483, 46273, 36291, // -20 .. -16
    29154, 23254, 18705, 14949, 11916, // -15 .. -11
    9548, 7620, 6100, 4904, 3906, // -10 .. -6
    3121, 2501, 1991, 1586, 1277, // -5 .. -1
    1024, 820, 655, 526, 423, // 0 .. 4
    335, 272, 215, 172, 137, // 5 .. 9
    110, 87, 70, 56, 45, // 10 .. 14
    36, 29, 23, 18, 15, // 15 .. 19
];

#[inline]
pub const fn nice_to_weight(nice: i8) -> u64 {
    let idx = nice as i32 + 20;
    let idx = if idx < 0 {
        0
    } else if idx > 39 {
        39
    } else {
        idx as usize
    };
    NICE_TO_WEIGHT[idx]
}

/// vruntime advance for `delta_exec_ns` of runtime at `weight`
#[inline]
pub fn calc_delta_vruntime(delta_exec_ns: u64, weight: u64) -> u64 {
    if weight == 0 {
        return delta_exec_ns;
    }
    ((delta_exec_ns as u128 * NICE_0_WEIGHT as u128) / weight as u128) as u64
}

// ============================================================================
// CPU mask
// ============================================================================

/// Bitmap of CPU ids, one bit per CPU up to `MAX_CPUS`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuMask(u64);

impl CpuMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// First `nr` CPUs set
    pub const fn first_n(nr: usize) -> Self {
        if nr >= MAX_CPUS {
            Self(u64::MAX)
        } else {
            Self((1u64 << nr) - 1)
        }
    }

    pub const fn all() -> Self {
        Self(u64::MAX)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Mask with exactly the listed CPUs; ids out of range are ignored.
    pub fn from_cpus(cpus: &[CpuId]) -> Self {
        let mut mask = Self::empty();
        for &cpu in cpus {
            mask.set(cpu);
        }
        mask
    }

    /// Mask with CPUs `first..=last`
    pub fn from_range(first: CpuId, last: CpuId) -> Self {
        let mut mask = Self::empty();
        for cpu in first..=last.min(MAX_CPUS - 1) {
            mask.set(cpu);
        }
        mask
    }

    #[inline]
    pub fn set(&mut self, cpu: CpuId) {
        if cpu < MAX_CPUS {
            self.0 |= 1 << cpu;
        }
    }

    #[inline]
    pub fn clear(&mut self, cpu: CpuId) {
        if cpu < MAX_CPUS {
            self.0 &= !(1 << cpu);
        }
    }

    #[inline]
    pub const fn is_set(&self, cpu: CpuId) -> bool {
        cpu < MAX_CPUS && self.0 & (1 << cpu) != 0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub const fn first_set(&self) -> Option<CpuId> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as CpuId)
        }
    }

    #[inline]
    pub const fn and(self, other: CpuMask) -> CpuMask {
        CpuMask(self.0 & other.0)
    }

    #[inline]
    pub const fn or(self, other: CpuMask) -> CpuMask {
        CpuMask(self.0 | other.0)
    }

    /// `self & !other`
    #[inline]
    pub const fn andnot(self, other: CpuMask) -> CpuMask {
        CpuMask(self.0 & !other.0)
    }

    pub const fn intersects(&self, other: &CpuMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Set CPUs in ascending order
    pub fn iter_set(&self) -> CpuMaskIter {
        CpuMaskIter { bits: self.0 }
    }
}

pub struct CpuMaskIter {
    bits: u64,
}

impl Iterator for CpuMaskIter {
    type Item = CpuId;

    fn next(&mut self) -> Option<CpuId> {
        if self.bits == 0 {
            return None;
        }
        let cpu = self.bits.trailing_zeros() as CpuId;
        self.bits &= self.bits - 1;
        Some(cpu)
    }
}

// ============================================================================
// Task classification tags
// ============================================================================

bitflags! {
    /// UX classification tags, set by the userspace-informed policy driver.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct UxType: u32 {
        const LIGHT    = 1 << 0;
        const HEAVY    = 1 << 1;
        const ANIMATOR = 1 << 2;
        const LISTPICK = 1 << 3;
        const SWIFT    = 1 << 4;
        const ONCE     = 1 << 5;
        const INHERIT  = 1 << 6;
        const STICKY   = 1 << 7;

        /// Tags that make a launch main thread "urgent"
        const URGENT = Self::LIGHT.bits() | Self::ANIMATOR.bits() | Self::SWIFT.bits();
    }
}

/// Bits of the ux state word that mark a task as UX
pub const UX_MASK: u32 = 0xFF;

impl UxType {
    #[inline]
    pub const fn is_ux(&self) -> bool {
        self.bits() & UX_MASK != 0
    }
}

bitflags! {
    /// Identity flags ("im flags") attached to well-known system threads.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ImFlags: u32 {
        const SURFACEFLINGER = 1 << 0;
        const HWC            = 1 << 1;
        const RENDERENGINE   = 1 << 2;
        const CAMERA_HAL     = 1 << 3;
        const AUDIO          = 1 << 4;
    }
}

/// System-wide UX context, set externally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scene {
    #[default]
    None,
    Launch,
    Anim,
    Camera,
    LauncherSi,
}

impl Scene {
    pub const fn as_str(self) -> &'static str {
        match self {
            Scene::None => "none",
            Scene::Launch => "launch",
            Scene::Anim => "anim",
            Scene::Camera => "camera",
            Scene::LauncherSi => "launcher_si",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "none" | "0" => Some(Scene::None),
            "launch" => Some(Scene::Launch),
            "anim" => Some(Scene::Anim),
            "camera" => Some(Scene::Camera),
            "launcher_si" => Some(Scene::LauncherSi),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_active(self) -> bool {
        !matches!(self, Scene::None)
    }
}

/// Cgroup class used by the place-entity vruntime compensation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupClass {
    Top,
    Foreground,
    Background,
    #[default]
    Default,
    /// Not covered by compensation
    Other,
}

// ============================================================================
// Task and CPU views
// ============================================================================

/// Stable handle of a task in the host's task arena.
///
/// The generation detects reuse of a slot after the task exits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId {
    index: u32,
    generation: u32,
}

impl TaskId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(&self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// Scheduling attributes of a task as seen by the policy.
#[derive(Clone, Copy, Debug)]
pub struct Task {
    pub id: TaskId,
    pub pid: u32,
    pub tgid: u32,
    pub ux_state: UxType,
    /// Lower is more urgent
    pub ux_priority: u8,
    pub im_flags: ImFlags,
    pub vip: bool,
    /// CPU the task is assigned to
    pub cpu: CpuId,
    /// Kernel priority, `< MAX_RT_PRIO` is real-time
    pub prio: i32,
    pub nice: i8,
    pub util_avg: u64,
    pub util_est: u64,
    pub uclamp_min: u64,
    pub uclamp_max: u64,
    pub on_rq: bool,
    /// Zero for a task with no utilization history
    pub last_update_time: u64,
    pub cpus_allowed: CpuMask,
    /// External "heavy load top task" predicate, sampled by the host
    pub heavy_load_top: bool,
    pub group: GroupClass,
}

impl Task {
    pub const fn new(pid: u32, tgid: u32) -> Self {
        Self {
            id: TaskId::new(0, 0),
            pid,
            tgid,
            ux_state: UxType::empty(),
            ux_priority: DEFAULT_UX_PRIORITY,
            im_flags: ImFlags::empty(),
            vip: false,
            cpu: 0,
            prio: 120,
            nice: 0,
            util_avg: 0,
            util_est: 0,
            uclamp_min: 0,
            uclamp_max: SCHED_CAPACITY_SCALE,
            on_rq: false,
            last_update_time: 0,
            cpus_allowed: CpuMask::all(),
            heavy_load_top: false,
            group: GroupClass::Default,
        }
    }

    #[inline]
    pub const fn is_ux(&self) -> bool {
        self.ux_state.is_ux()
    }

    #[inline]
    pub const fn is_rt(&self) -> bool {
        self.prio < MAX_RT_PRIO
    }

    #[inline]
    pub const fn is_main_thread(&self) -> bool {
        self.pid == self.tgid
    }

    #[inline]
    pub fn has_ux_type(&self, ty: UxType) -> bool {
        self.ux_state.intersects(ty)
    }

    #[inline]
    pub const fn weight(&self) -> u64 {
        nice_to_weight(self.nice)
    }
}

/// Snapshot of one CPU's run-queue counters.
///
/// Read without locks; values may be a tick stale.
#[derive(Clone, Copy, Debug)]
pub struct CpuRq {
    pub cpu: CpuId,
    /// Running task, `None` while the idle task runs
    pub curr: Option<TaskId>,
    pub nr_running: u32,
    /// Remote wakeup queued but not yet processed
    pub ttwu_pending: bool,
    /// Exit latency of the idle state the CPU sits in, 0 when not idle
    pub idle_exit_latency: u32,
    /// Runnable RT tasks, including a running one
    pub rt_nr_running: u32,
    pub util_avg: u64,
    pub runnable_avg: u64,
    pub util_est: u64,
    /// Capacity after frequency limits
    pub cpu_capacity: u64,
    /// Architectural capacity
    pub capacity_orig: u64,
    pub clock_ns: u64,
}

impl CpuRq {
    pub const fn new(cpu: CpuId) -> Self {
        Self {
            cpu,
            curr: None,
            nr_running: 0,
            ttwu_pending: false,
            idle_exit_latency: 0,
            rt_nr_running: 0,
            util_avg: 0,
            runnable_avg: 0,
            util_est: 0,
            cpu_capacity: SCHED_CAPACITY_SCALE,
            capacity_orig: SCHED_CAPACITY_SCALE,
            clock_ns: 0,
        }
    }
}
