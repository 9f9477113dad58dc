//! Decision statistics and placement trace
//!
//! Counters are relaxed atomics bumped from the hot paths. The trace ring
//! keeps the most recent placements for post-mortem inspection; it is only
//! filled while the `FTRACE` debug flag is set. Nothing here takes a lock.

use core::sync::atomic::{AtomicU64, Ordering};

use super::search::PlacementTier;
use super::skip::SkipReason;
use super::slot::SeqSlot;
use super::types::{CpuId, CpuMask};

/// Placement records kept in the ring
pub const TRACE_RING_SIZE: usize = 64;

/// One placement decision
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    pub pid: u32,
    pub tier: PlacementTier,
    pub orig_cpu: Option<CpuId>,
    pub cpu: CpuId,
    pub start_cluster: usize,
    pub final_cluster: usize,
    pub search_mask: CpuMask,
}

impl TraceRecord {
    pub const EMPTY: TraceRecord = TraceRecord {
        pid: 0,
        tier: PlacementTier::Idle,
        orig_cpu: None,
        cpu: 0,
        start_cluster: 0,
        final_cluster: 0,
        search_mask: CpuMask::empty(),
    };
}

/// Fixed ring of the latest placement records.
///
/// Lock-free: a push claims a sequence number and writes its slot, a reader
/// keeps only slots whose stamp matches the sequence it expects. A push
/// that finds its slot still held by a writer one lap behind drops the
/// record and counts it in `dropped`.
pub struct TraceRing {
    slots: [SeqSlot<TraceRecord>; TRACE_RING_SIZE],
    head: AtomicU64,
    dropped: AtomicU64,
}

impl TraceRing {
    pub const fn new() -> Self {
        Self {
            slots: [const { SeqSlot::empty() }; TRACE_RING_SIZE],
            head: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, record: TraceRecord) {
        let seq = self.head.fetch_add(1, Ordering::Relaxed);
        let slot = &self.slots[(seq % TRACE_RING_SIZE as u64) as usize];
        if !slot.try_write(seq, record) {
            bump(&self.dropped);
        }
    }

    /// Records ever pushed
    pub fn total(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    /// Pushes lost to a concurrent writer on the same slot
    pub fn dropped(&self) -> u64 {
        read(&self.dropped)
    }

    fn get(&self, seq: u64) -> Option<TraceRecord> {
        let slot = &self.slots[(seq % TRACE_RING_SIZE as u64) as usize];
        slot.read()
            .and_then(|(tag, record)| (tag == seq).then_some(record))
    }

    /// Copy records oldest first into `out`; returns the count written.
    pub fn recent(&self, out: &mut [TraceRecord]) -> usize {
        let end = self.total();
        let start = end.saturating_sub(TRACE_RING_SIZE as u64);
        let mut n = 0;
        for seq in start..end {
            if n >= out.len() {
                break;
            }
            if let Some(record) = self.get(seq) {
                out[n] = record;
                n += 1;
            }
        }
        n
    }

    pub fn last(&self) -> Option<TraceRecord> {
        let end = self.total();
        end.checked_sub(1).and_then(|seq| self.get(seq))
    }
}

impl Default for TraceRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of the counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Placements per tier, indexed by `PlacementTier::index()`
    pub placements: [u64; PlacementTier::COUNT],
    pub fastpath: u64,
    pub no_candidate: u64,
    pub skip_pipeline: u64,
    pub skip_cluster: u64,
    pub skip_rt: u64,
    pub skip_ux: u64,
    pub migrate_vetoed: u64,
    pub preempt: u64,
    pub nopreempt: u64,
    pub replace_picks: u64,
    pub stale_cpu: u64,
    pub stale_class: u64,
    pub stale_gone: u64,
}

pub struct AssistStats {
    placements: [AtomicU64; PlacementTier::COUNT],
    fastpath: AtomicU64,
    no_candidate: AtomicU64,
    skip_pipeline: AtomicU64,
    skip_cluster: AtomicU64,
    skip_rt: AtomicU64,
    skip_ux: AtomicU64,
    migrate_vetoed: AtomicU64,
    preempt: AtomicU64,
    nopreempt: AtomicU64,
    replace_picks: AtomicU64,
    stale_cpu: AtomicU64,
    stale_class: AtomicU64,
    stale_gone: AtomicU64,
    pub trace: TraceRing,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[inline]
fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl AssistStats {
    pub const fn new() -> Self {
        Self {
            placements: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
            fastpath: AtomicU64::new(0),
            no_candidate: AtomicU64::new(0),
            skip_pipeline: AtomicU64::new(0),
            skip_cluster: AtomicU64::new(0),
            skip_rt: AtomicU64::new(0),
            skip_ux: AtomicU64::new(0),
            migrate_vetoed: AtomicU64::new(0),
            preempt: AtomicU64::new(0),
            nopreempt: AtomicU64::new(0),
            replace_picks: AtomicU64::new(0),
            stale_cpu: AtomicU64::new(0),
            stale_class: AtomicU64::new(0),
            stale_gone: AtomicU64::new(0),
            trace: TraceRing::new(),
        }
    }

    pub fn record_placement(&self, tier: PlacementTier) {
        bump(&self.placements[tier.index()]);
    }

    pub fn record_fastpath(&self) {
        bump(&self.fastpath);
    }

    pub fn record_no_candidate(&self) {
        bump(&self.no_candidate);
    }

    pub fn record_pipeline_skip(&self) {
        bump(&self.skip_pipeline);
    }

    pub fn record_skip(&self, reason: SkipReason) {
        match reason {
            SkipReason::Cluster => bump(&self.skip_cluster),
            SkipReason::Rt => bump(&self.skip_rt),
            SkipReason::Ux => bump(&self.skip_ux),
        }
    }

    pub fn record_migrate_veto(&self) {
        bump(&self.migrate_vetoed);
    }

    pub fn record_preempt(&self, preempt: bool) {
        if preempt {
            bump(&self.preempt);
        } else {
            bump(&self.nopreempt);
        }
    }

    pub fn record_replace_pick(&self) {
        bump(&self.replace_picks);
    }

    pub fn record_stale(&self, wrong_cpu: u64, not_ux: u64, gone: u64) {
        self.stale_cpu.fetch_add(wrong_cpu, Ordering::Relaxed);
        self.stale_class.fetch_add(not_ux, Ordering::Relaxed);
        self.stale_gone.fetch_add(gone, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let mut placements = [0; PlacementTier::COUNT];
        for (out, counter) in placements.iter_mut().zip(self.placements.iter()) {
            *out = read(counter);
        }
        StatsSnapshot {
            placements,
            fastpath: read(&self.fastpath),
            no_candidate: read(&self.no_candidate),
            skip_pipeline: read(&self.skip_pipeline),
            skip_cluster: read(&self.skip_cluster),
            skip_rt: read(&self.skip_rt),
            skip_ux: read(&self.skip_ux),
            migrate_vetoed: read(&self.migrate_vetoed),
            preempt: read(&self.preempt),
            nopreempt: read(&self.nopreempt),
            replace_picks: read(&self.replace_picks),
            stale_cpu: read(&self.stale_cpu),
            stale_class: read(&self.stale_class),
            stale_gone: read(&self.stale_gone),
        }
    }
}

impl Default for AssistStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Dump counters and the latest placements through the logger.
pub fn list_stats(stats: &AssistStats) {
    let s = stats.snapshot();
    crate::kinfo!("=== sched_assist statistics ===");
    crate::kinfo!(
        "{:<10} {:<10} {:<10} {:<10} {:<10} {:<10} {:<10}",
        "idle", "spare_cap", "vip", "subopt", "spare_sub", "nr_cpu", "fastpath"
    );
    crate::kinfo!(
        "{:<10} {:<10} {:<10} {:<10} {:<10} {:<10} {:<10}",
        s.placements[0],
        s.placements[1],
        s.placements[2],
        s.placements[3],
        s.placements[4],
        s.placements[5],
        s.fastpath
    );
    crate::kinfo!(
        "No candidate: {} trace dropped: {}",
        s.no_candidate,
        stats.trace.dropped()
    );
    crate::kinfo!(
        "Skips: pipeline={} cluster={} rt={} ux={} migrate_veto={}",
        s.skip_pipeline,
        s.skip_cluster,
        s.skip_rt,
        s.skip_ux,
        s.migrate_vetoed
    );
    crate::kinfo!("Wakeup: preempt={} nopreempt={}", s.preempt, s.nopreempt);
    crate::kinfo!(
        "Replace next: picks={} stale_cpu={} stale_class={} stale_gone={}",
        s.replace_picks,
        s.stale_cpu,
        s.stale_class,
        s.stale_gone
    );

    let mut buf = [TraceRecord::EMPTY; TRACE_RING_SIZE];
    let n = stats.trace.recent(&mut buf);
    if n == 0 {
        return;
    }
    crate::kinfo!(
        "{:<8} {:<10} {:<6} {:<6} {:<6} {:<6} {:<18}",
        "PID", "Tier", "Orig", "CPU", "Start", "Final", "Mask"
    );
    for rec in &buf[n.saturating_sub(8)..n] {
        crate::kinfo!(
            "{:<8} {:<10} {:<6} {:<6} {:<6} {:<6} {:#018x}",
            rec.pid,
            rec.tier.as_str(),
            rec.orig_cpu.map_or(-1, |c| c as i64),
            rec.cpu,
            rec.start_cluster,
            rec.final_cluster,
            rec.search_mask.bits()
        );
    }
}
