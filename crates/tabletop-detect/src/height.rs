//! Robust per-cluster height and the candidate level list.

use tabletop_core::{Cloud, Cluster};

/// Result of [`trimmed_midrange`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrimmedMidrange {
    pub height: f32,
    /// trimming rounds performed
    pub rounds: usize,
    /// samples left when the loop stopped
    pub remaining: usize,
}

/// Midrange of `z` after repeatedly dropping the extreme samples.
///
/// Each round removes the highest sample if it sits more than `leaf` above the
/// midrange and the lowest if it sits more than `leaf` below it. The loop stops
/// once the spread is within `delta_z`, at most two samples remain, or neither
/// extreme qualifies. Returns `None` for an empty slice.
pub fn trimmed_midrange(z: &[f32], leaf: f32, delta_z: f32) -> Option<TrimmedMidrange> {
    if z.is_empty() {
        return None;
    }
    let mut work = z.to_vec();
    let mut rounds = 0;
    loop {
        let (mut lo, mut hi) = (0usize, 0usize);
        for (i, v) in work.iter().enumerate() {
            if *v < work[lo] { lo = i; }
            if *v > work[hi] { hi = i; }
        }
        let mid = (work[hi] + work[lo]) / 2.0;
        let spread = work[hi] - work[lo];
        if spread <= delta_z || work.len() <= 2 {
            return Some(TrimmedMidrange { height: mid, rounds, remaining: work.len() });
        }

        let high = (work[hi] - mid > leaf).then_some(hi);
        let low = (mid - work[lo] > leaf).then_some(lo);
        match (high, low) {
            (None, None) => {
                return Some(TrimmedMidrange { height: mid, rounds, remaining: work.len() });
            }
            (Some(h), Some(l)) => {
                // remove the larger index first so the other stays valid
                work.swap_remove(h.max(l));
                work.swap_remove(h.min(l));
            }
            (Some(i), None) | (None, Some(i)) => {
                work.swap_remove(i);
            }
        }
        rounds += 1;
    }
}

/// One candidate table height, with the size of the cluster that produced it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CandidateLevel {
    pub z: f32,
    pub support: usize,
}

/// Trimmed-midrange height of every non-empty cluster, ascending by height.
/// Close or equal heights are all kept; ties keep cluster order.
pub fn candidate_levels(cloud: &Cloud, clusters: &[Cluster], leaf: f32, delta_z: f32) -> Vec<CandidateLevel> {
    let mut levels: Vec<CandidateLevel> = clusters
        .iter()
        .filter_map(|cluster| {
            let z: Vec<f32> = cluster.iter().filter(|&&i| i < cloud.len()).map(|&i| cloud.z[i]).collect();
            trimmed_midrange(&z, leaf, delta_z).map(|m| CandidateLevel { z: m.height, support: z.len() })
        })
        .collect();
    levels.sort_by(|a, b| a.z.total_cmp(&b.z));
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const LEAF: f32 = 0.01;
    const DZ: f32 = 0.02;

    #[test]
    fn tight_cluster_returns_midpoint_untrimmed() {
        let z = [0.70, 0.71, 0.705, 0.715, 0.702];
        let m = trimmed_midrange(&z, LEAF, DZ).unwrap();
        assert_eq!(m.rounds, 0);
        assert_eq!(m.remaining, 5);
        assert_abs_diff_eq!(m.height, 0.7075, epsilon = 1e-6);
    }

    #[test]
    fn outliers_are_trimmed_away() {
        let mut z = vec![0.70f32; 40];
        for (i, v) in z.iter_mut().enumerate() { *v += (i % 5) as f32 * 0.002; }
        z.push(0.95);
        z.push(0.40);
        z.push(0.88);
        let m = trimmed_midrange(&z, LEAF, DZ).unwrap();
        assert!(m.rounds >= 2);
        assert_abs_diff_eq!(m.height, 0.704, epsilon = 1e-5);
    }

    #[test]
    fn result_stays_in_range_and_terminates() {
        let z: Vec<f32> = (0..57).map(|i| ((i * 37) % 101) as f32 * 0.013).collect();
        let (min, max) = (z.iter().cloned().fold(f32::MAX, f32::min), z.iter().cloned().fold(f32::MIN, f32::max));
        let m = trimmed_midrange(&z, LEAF, DZ).unwrap();
        assert!(m.height >= min && m.height <= max);
        assert!(m.rounds <= z.len());
        // every round removes one or two samples
        assert!(z.len() - m.remaining >= m.rounds);
        assert!(z.len() - m.remaining <= 2 * m.rounds);
    }

    #[test]
    fn two_points_converge_immediately() {
        let m = trimmed_midrange(&[0.0, 1.0], LEAF, DZ).unwrap();
        assert_eq!(m.rounds, 0);
        assert_abs_diff_eq!(m.height, 0.5);
        let m = trimmed_midrange(&[0.3], LEAF, DZ).unwrap();
        assert_abs_diff_eq!(m.height, 0.3);
        assert!(trimmed_midrange(&[], LEAF, DZ).is_none());
    }

    #[test]
    fn stops_when_nothing_qualifies() {
        // slab narrower than two leaves: extremes never clear `leaf`
        let m = trimmed_midrange(&[0.0, 0.015, 0.0, 0.015], LEAF, 0.01).unwrap();
        assert_eq!(m.rounds, 0);
        assert_eq!(m.remaining, 4);
        assert_abs_diff_eq!(m.height, 0.0075);
    }

    #[test]
    fn levels_sorted_and_empty_clusters_skipped() {
        let c = Cloud::from_points(&[
            [0.0, 0.0, 0.7], [0.1, 0.0, 0.71],
            [0.0, 0.0, 0.1], [0.1, 0.0, 0.1],
            [0.0, 0.0, 0.4],
        ]);
        let clusters = vec![vec![0, 1], vec![], vec![2, 3], vec![4]];
        let levels = candidate_levels(&c, &clusters, LEAF, DZ);
        let z: Vec<f32> = levels.iter().map(|l| l.z).collect();
        assert_eq!(levels.len(), 3);
        assert_abs_diff_eq!(z[0], 0.1);
        assert_abs_diff_eq!(z[1], 0.4);
        assert_abs_diff_eq!(z[2], 0.705, epsilon = 1e-6);
        assert_eq!(levels[0].support, 2);
    }
}
