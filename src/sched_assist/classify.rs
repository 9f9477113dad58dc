//! Task classification
//!
//! Pure functions of a task, the topology and a configuration snapshot.
//! They decide which capacity cluster a UX task should start from and which
//! special-case rules (launch main thread, strict UX, camera HAL) apply.

use super::config::{AssistConfig, CapacitySource};
use super::topology::ClusterTopology;
use super::types::{CpuId, CpuRq, ImFlags, Scene, Task, UxType};

/// `util` fits `capacity` with ~20% headroom.
#[inline]
pub const fn fits_capacity(util: u64, capacity: u64) -> bool {
    util.saturating_mul(1280) < capacity.saturating_mul(1024)
}

/// Task utilization clamped to its uclamp range
#[inline]
pub fn uclamp_task_util(task: &Task) -> u64 {
    let max = task.uclamp_max.max(task.uclamp_min);
    task.util_avg.clamp(task.uclamp_min, max)
}

/// Capacity a fit check against `rq` uses.
#[inline]
pub fn fit_capacity_of(rq: &CpuRq, cfg: &AssistConfig) -> u64 {
    match cfg.capacity_source {
        CapacitySource::Original => rq.capacity_orig,
        CapacitySource::Current => rq.cpu_capacity,
    }
}

#[inline]
pub fn task_fits_max(task: &Task, rq: &CpuRq, cfg: &AssistConfig) -> bool {
    fits_capacity(uclamp_task_util(task), fit_capacity_of(rq, cfg))
}

#[inline]
pub fn is_task_util_over(task: &Task, threshold: u64) -> bool {
    task.util_avg > threshold
}

/// Cluster the task should be placed on for the active scene.
///
/// With two clusters "mid" and "max" name the same cluster: the big one, or
/// the little one on devices whose little cluster is a performance tier.
pub fn preferred_cluster_for_scene(task: &Task, topo: &ClusterTopology, cfg: &AssistConfig) -> usize {
    let nr = topo.nr_clusters();
    if nr <= 1 {
        return 0;
    }

    let mut cls_max = nr - 1;
    let mut cls_mid = cls_max - 1;
    if cls_mid == 0 {
        if cfg.silver_perf_core {
            cls_max = cls_mid;
        } else {
            cls_mid = cls_max;
        }
    }

    if cfg.scene == Scene::Launch
        && task.is_main_thread()
        && task.has_ux_type(UxType::HEAVY | UxType::ANIMATOR)
    {
        return if task.has_ux_type(UxType::ANIMATOR) {
            cls_mid
        } else {
            cls_max
        };
    }

    if cfg.lowend_plat_opt && task.has_ux_type(UxType::HEAVY) && task.heavy_load_top {
        return cls_mid;
    }

    if cfg.scene == Scene::Anim && task.has_ux_type(UxType::ANIMATOR) {
        return if is_task_util_over(task, cfg.boost_threshold) {
            cls_mid
        } else {
            0
        };
    }

    if cfg.scene == Scene::LauncherSi {
        return if is_task_util_over(task, cfg.boost_threshold) {
            cls_mid
        } else {
            0
        };
    }

    if task.im_flags.contains(ImFlags::CAMERA_HAL) {
        return cls_mid;
    }

    0
}

/// True if `cpu` is at least as strong as the task's preferred cluster.
pub fn is_ux_task_prefer_cpu_for_scene(
    task: &Task,
    rq: &CpuRq,
    topo: &ClusterTopology,
    cfg: &AssistConfig,
) -> bool {
    if topo.nr_clusters() <= 1 {
        return true;
    }
    let preferred = preferred_cluster_for_scene(task, topo, cfg);
    rq.capacity_orig >= topo.capacity(preferred)
}

/// False only for launch-scene main threads without an urgent tag; those
/// bypass the RT and UX occupancy checks to keep a launching app together.
#[inline]
pub fn skip_rt_and_ux(task: &Task, cfg: &AssistConfig) -> bool {
    !(cfg.scene == Scene::Launch && task.is_main_thread() && !task.has_ux_type(UxType::URGENT))
}

/// Main thread of the top app during launch.
#[inline]
pub fn strict_ux_task(task: &Task, cfg: &AssistConfig) -> bool {
    cfg.scene == Scene::Launch && task.is_main_thread() && task.tgid == cfg.top_app_tgid
}

/// Scene-driven placement replaces EAS for UX tasks, except in camera.
pub fn should_ux_task_skip_eas(task: &Task, cfg: &AssistConfig) -> bool {
    task.is_ux() && cfg.scene.is_active() && cfg.scene != Scene::Camera
}

/// True if `cpu` is administratively halted.
#[inline]
pub fn cpu_halted(cfg: &AssistConfig, cpu: CpuId) -> bool {
    cfg.cpu_halted(cpu)
}
