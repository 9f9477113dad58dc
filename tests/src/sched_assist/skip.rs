//! Skip-CPU Filter Tests

use crate::mock::{captured_logs, leak, Fixture, PipelineVeto};
use sched_assist::logger::{self, LogLevel};
use sched_assist::skip::{should_skip_cpu, ux_skip_reason, SkipReason};
use sched_assist::{CollabRole, CpuMask, DebugFlags, ImFlags, Scene, Task, UxType};
use serial_test::serial;

fn camera_task(fx: &Fixture) -> Task {
    let mut task = fx.ux_thread(UxType::LIGHT);
    task.im_flags = ImFlags::CAMERA_HAL;
    task
}

#[test]
fn test_skip_reasons() {
    let mut fx = Fixture::three_clusters();
    fx.busy_rt(4, 100);
    fx.queue_ux(5);
    let task = fx.ux_thread(UxType::LIGHT);
    let camera = camera_task(&fx);

    assert_eq!(ux_skip_reason(&fx.ctx(), &task, 4), Some(SkipReason::Rt));
    assert_eq!(ux_skip_reason(&fx.ctx(), &task, 5), Some(SkipReason::Ux));
    assert_eq!(ux_skip_reason(&fx.ctx(), &task, 6), None);
    assert_eq!(ux_skip_reason(&fx.ctx(), &camera, 0), Some(SkipReason::Cluster));

    assert!(should_skip_cpu(&fx.ctx(), &task, 4));
    assert!(should_skip_cpu(&fx.ctx(), &task, 5));
    assert!(!should_skip_cpu(&fx.ctx(), &task, 6));
    assert!(should_skip_cpu(&fx.ctx(), &camera, 0));

    let stats = fx.engine.stats().snapshot();
    assert_eq!((stats.skip_rt, stats.skip_ux, stats.skip_cluster), (1, 1, 1));
}

#[test]
fn test_camera_task_ignores_ux_occupancy() {
    let mut fx = Fixture::three_clusters();
    let task = camera_task(&fx);
    fx.queue_ux(4);
    fx.queue_ux(4);
    fx.busy_ux(5, 200);
    fx.queue_ux(5);
    fx.busy_rt(6, 100);

    for cpu in 4..=5 {
        assert!(!should_skip_cpu(&fx.ctx(), &task, cpu), "cpu {}", cpu);
    }
    // RT and cluster mismatch still apply
    assert!(should_skip_cpu(&fx.ctx(), &task, 6));
    for cpu in 0..=3 {
        assert!(should_skip_cpu(&fx.ctx(), &task, cpu));
    }
}

#[test]
fn test_launch_main_thread_ignores_occupancy() {
    let mut fx = Fixture::three_clusters();
    fx.cfg.scene = Scene::Launch;
    let task = fx.ux_task(UxType::HEAVY);
    fx.busy_rt(7, 100);
    fx.queue_ux(7);

    assert!(!should_skip_cpu(&fx.ctx(), &task, 7));
    // Heavy launch main thread belongs on the prime cluster
    assert!(should_skip_cpu(&fx.ctx(), &task, 4));

    let urgent = fx.ux_task(UxType::HEAVY | UxType::SWIFT);
    assert!(should_skip_cpu(&fx.ctx(), &urgent, 7));
}

#[test]
fn test_pipeline_veto_applies_to_any_task() {
    let mut fx = Fixture::three_clusters();
    fx.register(
        CollabRole::Pipeline,
        0,
        leak(PipelineVeto {
            cpus: CpuMask::from_cpus(&[3]),
            pid: Some(9),
        }),
    );

    let pipeline = Task::new(9, 9);
    let other = Task::new(10, 10);
    assert!(should_skip_cpu(&fx.ctx(), &pipeline, 3));
    assert!(!should_skip_cpu(&fx.ctx(), &pipeline, 2));
    assert!(!should_skip_cpu(&fx.ctx(), &other, 3));
    assert_eq!(fx.engine.stats().snapshot().skip_pipeline, 1);
}

#[test]
fn test_disabled_filter_never_skips() {
    let mut fx = Fixture::three_clusters();
    fx.busy_rt(4, 100);
    fx.cfg.enabled = false;
    let task = fx.ux_thread(UxType::LIGHT);

    assert!(!should_skip_cpu(&fx.ctx(), &task, 4));
    assert!(!should_skip_cpu(&fx.ctx(), &camera_task(&fx), 0));
}

#[test]
fn test_out_of_range_cpu_not_skipped() {
    let mut fx = Fixture::three_clusters();
    fx.cfg.debug = DebugFlags::FTRACE;
    let task = fx.ux_thread(UxType::LIGHT);

    assert!(!should_skip_cpu(&fx.ctx(), &task, 40));
}

#[test]
#[serial]
fn test_skip_trace_names_pid_and_tgid() {
    let mut fx = Fixture::three_clusters();
    fx.cfg.debug = DebugFlags::FTRACE;
    let mut task = fx.ux_thread(UxType::LIGHT);
    task.pid = 4242;
    task.tgid = 4200;
    fx.busy_rt(5, 100);

    logger::set_max_level(LogLevel::TRACE);
    let skipped = should_skip_cpu(&fx.ctx(), &task, 5);
    logger::set_max_level(LogLevel::INFO);

    assert!(skipped);
    assert!(captured_logs().contains("ux task pid=4242 tgid=4200 skip_cpu=5 reason=1"));
}
