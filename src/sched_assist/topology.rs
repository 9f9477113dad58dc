//! Capacity cluster topology
//!
//! Built once at boot from the platform's cluster description and read
//! without locking afterwards. Cluster 0 is the weakest, the last index the
//! strongest.

use super::error::AssistError;
use super::types::{CpuId, CpuMask, MAX_CLUSTERS, MAX_CPUS};

const NO_CLUSTER: u8 = u8::MAX;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cluster {
    pub cpus: CpuMask,
    /// Architectural capacity of the cluster's CPUs
    pub capacity: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct ClusterTopology {
    clusters: [Cluster; MAX_CLUSTERS],
    nr: usize,
    cpu_cluster: [u8; MAX_CPUS],
}

impl ClusterTopology {
    /// Topology with no clusters; every policy collapses to "no preference".
    pub const fn empty() -> Self {
        Self {
            clusters: [Cluster {
                cpus: CpuMask::empty(),
                capacity: 0,
            }; MAX_CLUSTERS],
            nr: 0,
            cpu_cluster: [NO_CLUSTER; MAX_CPUS],
        }
    }

    /// Build from clusters listed weakest first.
    pub fn new(clusters: &[Cluster]) -> Result<Self, AssistError> {
        if clusters.len() > MAX_CLUSTERS {
            return Err(AssistError::TooManyClusters(clusters.len()));
        }

        let mut topo = Self::empty();
        for (idx, cluster) in clusters.iter().enumerate() {
            if cluster.cpus.is_empty() {
                return Err(AssistError::EmptyCluster(idx));
            }
            for cpu in cluster.cpus.iter_set() {
                if topo.cpu_cluster[cpu] != NO_CLUSTER {
                    return Err(AssistError::OverlappingCluster { cpu });
                }
                topo.cpu_cluster[cpu] = idx as u8;
            }
            topo.clusters[idx] = *cluster;
        }
        topo.nr = clusters.len();

        crate::kinfo!("sched_assist: {} capacity clusters", topo.nr);
        for (idx, cluster) in topo.clusters().iter().enumerate() {
            crate::kdebug!(
                "sched_assist: cluster {} cpus={:#x} capacity={}",
                idx,
                cluster.cpus.bits(),
                cluster.capacity
            );
        }
        Ok(topo)
    }

    /// Convenience constructor from `(first_cpu, last_cpu, capacity)` ranges.
    pub fn from_ranges(ranges: &[(CpuId, CpuId, u64)]) -> Result<Self, AssistError> {
        if ranges.len() > MAX_CLUSTERS {
            return Err(AssistError::TooManyClusters(ranges.len()));
        }
        let mut clusters = [Cluster::default(); MAX_CLUSTERS];
        for (slot, &(first, last, capacity)) in clusters.iter_mut().zip(ranges) {
            if first >= MAX_CPUS || last >= MAX_CPUS {
                return Err(AssistError::CpuOutOfRange(first.max(last)));
            }
            *slot = Cluster {
                cpus: CpuMask::from_range(first, last),
                capacity,
            };
        }
        Self::new(&clusters[..ranges.len()])
    }

    #[inline]
    pub fn nr_clusters(&self) -> usize {
        self.nr
    }

    /// Index of the strongest cluster, 0 when degenerate
    #[inline]
    pub fn max_index(&self) -> usize {
        self.nr.saturating_sub(1)
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters[..self.nr]
    }

    pub fn cluster(&self, idx: usize) -> Option<&Cluster> {
        self.clusters().get(idx)
    }

    /// Cluster of `cpu`; CPUs outside the topology count as cluster 0.
    pub fn cluster_of(&self, cpu: CpuId) -> usize {
        match self.cpu_cluster.get(cpu) {
            Some(&idx) if idx != NO_CLUSTER => idx as usize,
            _ => 0,
        }
    }

    pub fn cluster_mask(&self, idx: usize) -> CpuMask {
        self.cluster(idx).map_or(CpuMask::empty(), |c| c.cpus)
    }

    pub fn capacity(&self, idx: usize) -> u64 {
        self.cluster(idx).map_or(0, |c| c.capacity)
    }
}

// ============================================================================
// Cluster walk
// ============================================================================

/// Order in which the candidate search visits clusters.
///
/// Starts at `start` and steps one cluster per round: upward when `start`
/// is below the strongest cluster, downward otherwise. Without widening the
/// walk never enters cluster 0 unless it started there. With widening, an
/// upward walk that runs off the top restarts just below `start` and
/// continues down to cluster 0.
#[derive(Clone, Debug)]
pub struct ClusterWalk {
    next: Option<usize>,
    start: usize,
    nr: usize,
    upward: bool,
    widen: bool,
}

impl ClusterWalk {
    pub fn new(start: usize, nr_clusters: usize, widen: bool) -> Self {
        let next = if start < nr_clusters { Some(start) } else { None };
        Self {
            next,
            start,
            nr: nr_clusters,
            upward: start + 1 != nr_clusters,
            widen,
        }
    }

    fn step(&mut self, cls: usize) -> Option<usize> {
        if self.upward {
            let up = cls + 1;
            if up < self.nr {
                return Some(up);
            }
            if self.widen && self.start != 0 {
                self.upward = false;
                return Some(self.start - 1);
            }
            return None;
        }

        let down = cls.checked_sub(1)?;
        if down > 0 || self.widen {
            Some(down)
        } else {
            None
        }
    }
}

impl Iterator for ClusterWalk {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let cls = self.next?;
        self.next = self.step(cls);
        Some(cls)
    }
}
