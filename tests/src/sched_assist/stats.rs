//! Statistics and Trace Ring Tests

use std::thread;

use sched_assist::search::PlacementTier;
use sched_assist::stats::{TraceRecord, TraceRing, TRACE_RING_SIZE};
use sched_assist::CpuMask;

fn record(pid: u32) -> TraceRecord {
    let cpu = (pid % 8) as usize;
    TraceRecord {
        pid,
        tier: PlacementTier::SpareCap,
        orig_cpu: Some(cpu),
        cpu,
        start_cluster: cpu / 4,
        final_cluster: cpu / 4,
        search_mask: CpuMask::from_cpus(&[cpu]),
    }
}

fn consistent(r: &TraceRecord) -> bool {
    let cpu = (r.pid % 8) as usize;
    r.cpu == cpu
        && r.orig_cpu == Some(cpu)
        && r.final_cluster == cpu / 4
        && r.search_mask == CpuMask::from_cpus(&[cpu])
}

#[test]
fn test_ring_keeps_latest_in_order() {
    let ring = TraceRing::new();
    assert_eq!(ring.last(), None);

    for pid in 1..=100 {
        ring.push(record(pid));
    }

    let mut out = [TraceRecord::EMPTY; TRACE_RING_SIZE];
    let n = ring.recent(&mut out);
    assert_eq!(n, TRACE_RING_SIZE);
    assert_eq!(out[0].pid, 100 - TRACE_RING_SIZE as u32 + 1);
    assert_eq!(out[n - 1].pid, 100);
    assert_eq!(ring.last().map(|r| r.pid), Some(100));
    assert_eq!((ring.total(), ring.dropped()), (100, 0));

    let mut short = [TraceRecord::EMPTY; 4];
    assert_eq!(ring.recent(&mut short), 4);
    assert_eq!(short[0].pid, out[0].pid);
}

#[test]
fn test_concurrent_pushes_never_block_or_tear() {
    const THREADS: u32 = 8;
    const PER_THREAD: u32 = 5_000;
    let ring = TraceRing::new();

    thread::scope(|s| {
        for t in 0..THREADS {
            let ring = &ring;
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    ring.push(record(t * PER_THREAD + i + 1));
                }
            });
        }

        // Reader running alongside the writers
        let mut out = [TraceRecord::EMPTY; TRACE_RING_SIZE];
        for _ in 0..1_000 {
            let n = ring.recent(&mut out);
            assert!(n <= TRACE_RING_SIZE);
            assert!(out[..n].iter().all(consistent));
        }
    });

    assert_eq!(ring.total(), u64::from(THREADS * PER_THREAD));
    let mut out = [TraceRecord::EMPTY; TRACE_RING_SIZE];
    let n = ring.recent(&mut out);
    assert!(out[..n].iter().all(consistent));
    if let Some(last) = ring.last() {
        assert!(consistent(&last));
    }
}
