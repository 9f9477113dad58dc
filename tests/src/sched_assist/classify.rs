//! Classification Tests
//!
//! Scene-preferred cluster selection and the launch/camera special cases.

use crate::mock::Fixture;
use sched_assist::classify::{
    fits_capacity, is_ux_task_prefer_cpu_for_scene, preferred_cluster_for_scene, should_ux_task_skip_eas,
    skip_rt_and_ux, strict_ux_task, task_fits_max,
};
use sched_assist::{ImFlags, Scene, SchedEnv, Task, UxType};

/// 3 clusters with capacities {100, 300, 1024}
fn small_mid_big() -> Fixture {
    Fixture::new(&[(0, 3, 100), (4, 6, 300), (7, 7, 1024)])
}

#[test]
fn test_launch_heavy_main_thread_prefers_max() {
    let mut fx = small_mid_big();
    fx.cfg.scene = Scene::Launch;
    let mut task = fx.ux_task(UxType::HEAVY);
    task.util_avg = 900;

    assert_eq!(preferred_cluster_for_scene(&task, fx.engine.topology(), &fx.cfg), 2);
}

#[test]
fn test_untagged_task_prefers_cluster_zero() {
    let fx = small_mid_big();
    let task = Task::new(42, 42);

    assert_eq!(fx.cfg.scene, Scene::None);
    assert_eq!(preferred_cluster_for_scene(&task, fx.engine.topology(), &fx.cfg), 0);
}

#[test]
fn test_launch_animator_main_thread_prefers_mid() {
    let mut fx = small_mid_big();
    fx.cfg.scene = Scene::Launch;
    let task = fx.ux_task(UxType::ANIMATOR | UxType::HEAVY);

    assert_eq!(preferred_cluster_for_scene(&task, fx.engine.topology(), &fx.cfg), 1);
}

#[test]
fn test_launch_rule_needs_main_thread() {
    let mut fx = small_mid_big();
    fx.cfg.scene = Scene::Launch;
    let task = fx.ux_thread(UxType::HEAVY);

    assert_eq!(preferred_cluster_for_scene(&task, fx.engine.topology(), &fx.cfg), 0);
}

#[test]
fn test_anim_scene_boosts_busy_animator() {
    let mut fx = small_mid_big();
    fx.cfg.scene = Scene::Anim;
    let topo = *fx.engine.topology();

    let mut task = fx.ux_thread(UxType::ANIMATOR);
    task.util_avg = fx.cfg.boost_threshold;
    assert_eq!(preferred_cluster_for_scene(&task, &topo, &fx.cfg), 0);

    task.util_avg = fx.cfg.boost_threshold + 1;
    assert_eq!(preferred_cluster_for_scene(&task, &topo, &fx.cfg), 1);

    // Only animators are boosted in this scene
    task.ux_state = UxType::LIGHT;
    assert_eq!(preferred_cluster_for_scene(&task, &topo, &fx.cfg), 0);
}

#[test]
fn test_launcher_si_boosts_any_busy_task() {
    let mut fx = small_mid_big();
    fx.cfg.scene = Scene::LauncherSi;
    let mut task = fx.ux_thread(UxType::LIGHT);
    task.util_avg = 200;

    assert_eq!(preferred_cluster_for_scene(&task, fx.engine.topology(), &fx.cfg), 1);
    task.util_avg = 10;
    assert_eq!(preferred_cluster_for_scene(&task, fx.engine.topology(), &fx.cfg), 0);
}

#[test]
fn test_camera_hal_prefers_mid() {
    let fx = small_mid_big();
    let mut task = fx.ux_thread(UxType::LIGHT);
    task.im_flags = ImFlags::CAMERA_HAL;

    assert_eq!(preferred_cluster_for_scene(&task, fx.engine.topology(), &fx.cfg), 1);
}

#[test]
fn test_lowend_heavy_top_task_prefers_mid() {
    let mut fx = small_mid_big();
    let mut task = fx.ux_thread(UxType::HEAVY);
    task.heavy_load_top = true;
    assert_eq!(preferred_cluster_for_scene(&task, fx.engine.topology(), &fx.cfg), 0);

    fx.cfg.lowend_plat_opt = true;
    assert_eq!(preferred_cluster_for_scene(&task, fx.engine.topology(), &fx.cfg), 1);
}

#[test]
fn test_two_clusters_collapse_mid_and_max() {
    let mut fx = Fixture::two_clusters();
    fx.cfg.scene = Scene::Launch;
    let topo = *fx.engine.topology();
    let heavy = fx.ux_task(UxType::HEAVY);
    let animator = fx.ux_task(UxType::ANIMATOR);

    assert_eq!(preferred_cluster_for_scene(&heavy, &topo, &fx.cfg), 1);
    assert_eq!(preferred_cluster_for_scene(&animator, &topo, &fx.cfg), 1);

    // The little cluster is the performance tier
    fx.cfg.silver_perf_core = true;
    assert_eq!(preferred_cluster_for_scene(&heavy, &topo, &fx.cfg), 0);
    assert_eq!(preferred_cluster_for_scene(&animator, &topo, &fx.cfg), 0);
}

#[test]
fn test_single_cluster_has_no_preference() {
    let mut fx = Fixture::new(&[(0, 3, 1024)]);
    fx.cfg.scene = Scene::Launch;
    let task = fx.ux_task(UxType::HEAVY);

    assert_eq!(preferred_cluster_for_scene(&task, fx.engine.topology(), &fx.cfg), 0);
    let rq = fx.machine.cpu_rq(0).expect("cpu 0");
    assert!(is_ux_task_prefer_cpu_for_scene(&task, rq, fx.engine.topology(), &fx.cfg));
}

#[test]
fn test_classification_is_pure() {
    let mut fx = small_mid_big();
    let topo = *fx.engine.topology();
    let scenes = [Scene::None, Scene::Launch, Scene::Anim, Scene::Camera, Scene::LauncherSi];
    let tags = [UxType::empty(), UxType::LIGHT, UxType::HEAVY, UxType::ANIMATOR, UxType::SWIFT];

    for scene in scenes {
        fx.cfg.scene = scene;
        for ux in tags {
            for util in [0, 51, 52, 900] {
                let mut task = fx.ux_task(ux);
                task.util_avg = util;
                let first = preferred_cluster_for_scene(&task, &topo, &fx.cfg);
                let second = preferred_cluster_for_scene(&task, &topo, &fx.cfg);
                assert_eq!(first, second, "scene {:?} ux {:?} util {}", scene, ux, util);
                assert!(first < topo.nr_clusters());
            }
        }
    }
}

#[test]
fn test_prefer_cpu_compares_capacity() {
    let fx = Fixture::three_clusters();
    let mut task = fx.ux_thread(UxType::LIGHT);
    task.im_flags = ImFlags::CAMERA_HAL;
    let topo = fx.engine.topology();

    let little = fx.machine.cpu_rq(2).expect("cpu 2");
    let mid = fx.machine.cpu_rq(4).expect("cpu 4");
    let prime = fx.machine.cpu_rq(7).expect("cpu 7");
    assert!(!is_ux_task_prefer_cpu_for_scene(&task, little, topo, &fx.cfg));
    assert!(is_ux_task_prefer_cpu_for_scene(&task, mid, topo, &fx.cfg));
    assert!(is_ux_task_prefer_cpu_for_scene(&task, prime, topo, &fx.cfg));
}

#[test]
fn test_launch_main_thread_bypasses_occupancy_checks() {
    let mut fx = Fixture::three_clusters();
    let plain_main = fx.ux_task(UxType::HEAVY);
    let urgent_main = fx.ux_task(UxType::HEAVY | UxType::LIGHT);
    let thread = fx.ux_thread(UxType::HEAVY);

    assert!(skip_rt_and_ux(&plain_main, &fx.cfg));

    fx.cfg.scene = Scene::Launch;
    assert!(!skip_rt_and_ux(&plain_main, &fx.cfg));
    assert!(skip_rt_and_ux(&urgent_main, &fx.cfg));
    assert!(skip_rt_and_ux(&thread, &fx.cfg));
}

#[test]
fn test_strict_ux_is_top_app_main_thread_in_launch() {
    let mut fx = Fixture::three_clusters();
    let task = fx.ux_task(UxType::HEAVY);
    fx.cfg.scene = Scene::Launch;
    assert!(!strict_ux_task(&task, &fx.cfg));

    fx.cfg.top_app_tgid = task.tgid;
    assert!(strict_ux_task(&task, &fx.cfg));
    assert!(!strict_ux_task(&fx.ux_thread(UxType::HEAVY), &fx.cfg));

    fx.cfg.scene = Scene::Anim;
    assert!(!strict_ux_task(&task, &fx.cfg));
}

#[test]
fn test_skip_eas_outside_camera() {
    let mut fx = Fixture::three_clusters();
    let ux = fx.ux_thread(UxType::LIGHT);
    let plain = Task::new(7, 7);

    assert!(!should_ux_task_skip_eas(&ux, &fx.cfg));
    fx.cfg.scene = Scene::Anim;
    assert!(should_ux_task_skip_eas(&ux, &fx.cfg));
    assert!(!should_ux_task_skip_eas(&plain, &fx.cfg));
    fx.cfg.scene = Scene::Camera;
    assert!(!should_ux_task_skip_eas(&ux, &fx.cfg));
}

#[test]
fn test_fit_uses_twenty_percent_margin() {
    let fx = Fixture::three_clusters();
    let rq = fx.machine.cpu_rq(0).expect("cpu 0");
    let mut task = Task::new(1, 1);

    // 400 * 1024 / 1280 = 320
    task.util_avg = 319;
    assert!(task_fits_max(&task, rq, &fx.cfg));
    task.util_avg = 320;
    assert!(!task_fits_max(&task, rq, &fx.cfg));
    assert!(fits_capacity(319, 400));
}
