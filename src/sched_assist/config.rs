//! Policy configuration
//!
//! Every input the external policy driver publishes lives in one `Copy`
//! snapshot, [`AssistConfig`]. Decision functions take the snapshot by
//! reference, so a single call never observes a half-applied update.
//!
//! Configuration can be set programmatically or from a directive string in
//! the style of a boot command line:
//!
//! ```text
//! enabled=1 scene=launch silver_perf_core=0 lowend_plat_opt=1 halt=4-5
//! top_app_tgid=1200 debug=ftrace util_est=1 boost_threshold=51 log=debug
//! ```

use core::convert::Infallible;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bitflags::bitflags;
use spin::Mutex;

use crate::logger;

use super::error::AssistError;
use super::slot::SeqSlot;
use super::types::{CpuMask, Scene, BOOST_THRESHOLD_UNIT, MAX_CLUSTERS, UX_WAKEUP_GRAN_NS};

bitflags! {
    /// Diagnostic switches
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DebugFlags: u32 {
        const SYSTRACE = 1 << 0;
        /// Record placement and skip decisions in the trace ring
        const FTRACE   = 1 << 1;
        const EAS_OPT  = 1 << 2;
    }
}

impl DebugFlags {
    fn from_debug_name(name: &str) -> Option<Self> {
        match name {
            "systrace" => Some(DebugFlags::SYSTRACE),
            "ftrace" => Some(DebugFlags::FTRACE),
            "eas_opt" => Some(DebugFlags::EAS_OPT),
            _ => None,
        }
    }
}

/// Which capacity figure fit checks and spare capacity use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CapacitySource {
    /// Architectural capacity, aware of the frequency limiter on QCOM
    #[default]
    Original,
    /// Run-queue `cpu_capacity`, reduced by RT/IRQ pressure
    Current,
}

/// Group vruntime compensation applied from `place_entity`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupAdjust {
    pub enabled: bool,
    pub std_vtime_slice_ns: u64,
    /// Compensation factor per group: top, foreground, background, default
    pub compensate: [u64; 4],
    /// Per-cluster capacity multiple in percent
    pub cap_multiple: [u64; MAX_CLUSTERS],
}

impl GroupAdjust {
    pub const fn new() -> Self {
        Self {
            enabled: false,
            std_vtime_slice_ns: 0,
            compensate: [0; 4],
            cap_multiple: [100; MAX_CLUSTERS],
        }
    }
}

impl Default for GroupAdjust {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssistConfig {
    /// Master switch; when clear every hook defers to the kernel
    pub enabled: bool,
    pub scene: Scene,
    /// Device treats its little cluster as a performance tier
    pub silver_perf_core: bool,
    /// Low-end platform: widen the search back toward cluster 0
    pub lowend_plat_opt: bool,
    /// CPUs administratively excluded from placement
    pub halt_mask: CpuMask,
    /// Thread group of the foreground app
    pub top_app_tgid: u32,
    pub debug: DebugFlags,
    pub util_est: bool,
    pub boost_threshold: u64,
    pub wakeup_gran_ns: u64,
    pub capacity_source: CapacitySource,
    /// An external (BPF) scheduling class owns pick-next
    pub ext_sched_active: bool,
    pub eevdf_compat: bool,
    pub group_adjust: GroupAdjust,
}

impl AssistConfig {
    pub const fn new() -> Self {
        Self {
            enabled: true,
            scene: Scene::None,
            silver_perf_core: false,
            lowend_plat_opt: false,
            halt_mask: CpuMask::empty(),
            top_app_tgid: 0,
            debug: DebugFlags::empty(),
            util_est: cfg!(feature = "util_est"),
            boost_threshold: BOOST_THRESHOLD_UNIT,
            wakeup_gran_ns: UX_WAKEUP_GRAN_NS,
            capacity_source: CapacitySource::Original,
            ext_sched_active: false,
            eevdf_compat: false,
            group_adjust: GroupAdjust::new(),
        }
    }

    #[inline]
    pub fn cpu_halted(&self, cpu: usize) -> bool {
        self.halt_mask.is_set(cpu)
    }

    #[inline]
    pub fn ftrace(&self) -> bool {
        self.debug.contains(DebugFlags::FTRACE)
    }

    /// Apply one `key=value` directive.
    pub fn apply_directive(&mut self, key: &str, value: &str) -> Result<(), AssistError> {
        match key {
            "enabled" => self.enabled = parse_bool(value)?,
            "scene" => self.scene = Scene::from_str(value).ok_or(AssistError::InvalidValue)?,
            "silver_perf_core" => self.silver_perf_core = parse_bool(value)?,
            "lowend_plat_opt" => self.lowend_plat_opt = parse_bool(value)?,
            "halt" => self.halt_mask = parse_cpu_list(value)?,
            "top_app_tgid" => self.top_app_tgid = parse_u64(value)? as u32,
            "debug" => self.debug = parse_debug(value)?,
            "util_est" => self.util_est = parse_bool(value)?,
            "boost_threshold" => self.boost_threshold = parse_u64(value)?,
            "wakeup_gran_ns" => self.wakeup_gran_ns = parse_u64(value)?,
            "capacity" => {
                self.capacity_source = match value {
                    "orig" | "original" => CapacitySource::Original,
                    "curr" | "current" => CapacitySource::Current,
                    _ => return Err(AssistError::InvalidValue),
                }
            }
            "ext_sched" => self.ext_sched_active = parse_bool(value)?,
            "eevdf_compat" => self.eevdf_compat = parse_bool(value)?,
            "group_adjust" => self.group_adjust.enabled = parse_bool(value)?,
            "group_slice_ns" => self.group_adjust.std_vtime_slice_ns = parse_u64(value)?,
            _ => return Err(AssistError::UnknownKey),
        }
        Ok(())
    }

    /// Apply whitespace-separated directives.
    ///
    /// All or nothing: on the first bad token `self` is left untouched.
    /// `log=`/`loglevel=` tokens belong to the logger and are skipped here.
    /// Returns the number of directives applied.
    pub fn apply_directives(&mut self, cmdline: &str) -> Result<usize, AssistError> {
        let mut next = *self;
        let mut applied = 0;

        for token in cmdline.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                crate::kwarn!("sched_assist: malformed directive '{}'", token);
                return Err(AssistError::InvalidValue);
            };
            if key == "log" || key == "loglevel" {
                continue;
            }
            if let Err(err) = next.apply_directive(key, value) {
                crate::kwarn!("sched_assist: directive '{}': {}", token, err);
                return Err(err);
            }
            applied += 1;
        }

        *self = next;
        Ok(applied)
    }

    pub fn from_directives(cmdline: &str) -> Result<Self, AssistError> {
        let mut cfg = Self::new();
        cfg.apply_directives(cmdline)?;
        Ok(cfg)
    }
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(value: &str) -> Result<bool, AssistError> {
    match value {
        "1" | "y" | "on" | "true" => Ok(true),
        "0" | "n" | "off" | "false" => Ok(false),
        _ => Err(AssistError::InvalidValue),
    }
}

fn parse_u64(value: &str) -> Result<u64, AssistError> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|_| AssistError::InvalidValue)
}

fn parse_debug(value: &str) -> Result<DebugFlags, AssistError> {
    if let Ok(bits) = parse_u64(value) {
        return Ok(DebugFlags::from_bits_truncate(bits as u32));
    }
    let mut flags = DebugFlags::empty();
    for name in value.split(',').filter(|s| !s.is_empty()) {
        flags |= DebugFlags::from_debug_name(name).ok_or(AssistError::InvalidValue)?;
    }
    Ok(flags)
}

/// Parse a CPU list such as `0,2,4-5`. An empty string is the empty mask.
pub fn parse_cpu_list(value: &str) -> Result<CpuMask, AssistError> {
    let mut mask = CpuMask::empty();
    for part in value.split(',').filter(|s| !s.is_empty()) {
        let (first, last) = match part.split_once('-') {
            Some((a, b)) => (parse_u64(a)? as usize, parse_u64(b)? as usize),
            None => {
                let cpu = parse_u64(part)? as usize;
                (cpu, cpu)
            }
        };
        if first > last || last >= super::types::MAX_CPUS {
            return Err(AssistError::InvalidValue);
        }
        mask = mask.or(CpuMask::from_range(first, last));
    }
    Ok(mask)
}

// ============================================================================
// Publisher
// ============================================================================

/// Versioned holder of the current configuration.
///
/// Writers are the external policy driver; readers take a snapshot at the
/// start of each hook and pass it down.
///
/// Two slots alternate: a writer fills the idle one and then flips
/// `active`, so the slot readers are directed to is never being written.
/// Readers take no lock and only retry when two publications overtake a
/// single copy. Writers serialize on `writer`, which no hook takes, and
/// must not run from interrupt context.
pub struct ConfigPublisher {
    slots: [SeqSlot<AssistConfig>; 2],
    active: AtomicUsize,
    version: AtomicU64,
    writer: Mutex<()>,
}

impl ConfigPublisher {
    pub const fn new(cfg: AssistConfig) -> Self {
        Self {
            slots: [SeqSlot::new(cfg), SeqSlot::new(cfg)],
            active: AtomicUsize::new(0),
            version: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    /// Run `f` on a copy of the current configuration and publish the
    /// result unless `f` fails.
    fn write_with<R, E>(
        &self,
        f: impl FnOnce(&mut AssistConfig) -> Result<R, E>,
    ) -> Result<(u64, R), E> {
        let _writer = self.writer.lock();

        let mut next = self.snapshot();
        let out = f(&mut next)?;

        let version = self.version.load(Ordering::Relaxed) + 1;
        let idle = self.active.load(Ordering::Relaxed) ^ 1;
        // Idle slot is only touched by writers, and we are the only one
        let written = self.slots[idle].try_write(version, next);
        debug_assert!(written);
        self.active.store(idle, Ordering::Release);
        self.version.store(version, Ordering::Release);

        Ok((version, out))
    }

    /// Replace the configuration; returns the new version.
    pub fn publish(&self, cfg: AssistConfig) -> u64 {
        self.update(|current| *current = cfg)
    }

    /// Modify the configuration; returns the new version.
    ///
    /// `f` works on a private copy: hooks running meanwhile, even on this
    /// CPU, keep seeing the previous configuration.
    pub fn update(&self, f: impl FnOnce(&mut AssistConfig)) -> u64 {
        let result = self.write_with(|cfg| {
            f(cfg);
            Ok::<(), Infallible>(())
        });
        match result {
            Ok((version, ())) => version,
            Err(never) => match never {},
        }
    }

    /// Lock-free copy of the current configuration.
    pub fn snapshot(&self) -> AssistConfig {
        loop {
            let idx = self.active.load(Ordering::Acquire) & 1;
            if let Some((_, cfg)) = self.slots[idx].read() {
                return cfg;
            }
            core::hint::spin_loop();
        }
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Apply a directive string, including any log level token.
    pub fn apply_cmdline(&self, cmdline: &str) -> Result<u64, AssistError> {
        let (version, (applied, next)) = self.write_with(|cfg| {
            let applied = cfg.apply_directives(cmdline)?;
            Ok::<_, AssistError>((applied, *cfg))
        })?;

        if let Some(level) = logger::parse_level_directive(cmdline) {
            logger::set_max_level(level);
            crate::kinfo!("sched_assist: log level set to {}", level.as_str());
        }

        crate::kinfo!(
            "sched_assist: config v{} ({} directives) enabled={} scene={}",
            version,
            applied,
            next.enabled,
            next.scene.as_str()
        );
        Ok(version)
    }
}

static GLOBAL_CONFIG: ConfigPublisher = ConfigPublisher::new(AssistConfig::new());

/// Process-wide publisher used by the hook entry points.
pub fn global() -> &'static ConfigPublisher {
    &GLOBAL_CONFIG
}
