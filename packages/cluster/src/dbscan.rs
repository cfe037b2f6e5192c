//! Density-based clustering (DBSCAN) over planar points.

use std::collections::{BTreeMap, VecDeque};

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::{ClusterError, NeighborIndex};

/// Cluster id for points that belong to no cluster.
pub const NOISE: u32 = 0;

/// Cluster label per input point.
///
/// Ids are `1..=cluster_count` in discovery order; [`NOISE`] marks noise.
/// Ids only identify membership and carry no ordering meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    /// One label per input point, in input order.
    pub labels: Vec<u32>,
    /// Number of distinct non-noise ids.
    pub cluster_count: u32,
}

impl ClusterAssignment {
    /// Number of points labelled noise.
    #[must_use]
    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }

    /// `(point index, cluster id)` for every non-noise point, in input
    /// order.
    #[must_use]
    pub fn without_noise(&self) -> Vec<(usize, u32)> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label != NOISE)
            .map(|(i, label)| (i, *label))
            .collect()
    }

    /// Point indices grouped by cluster id. Noise is not included.
    #[must_use]
    pub fn clusters(&self) -> BTreeMap<u32, Vec<usize>> {
        let mut clusters: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (index, cluster) in self.without_noise() {
            clusters.entry(cluster).or_default().push(index);
        }
        clusters
    }

    /// Clusters as sorted member lists, independent of id numbering. Two
    /// assignments with the same partition compare equal here.
    #[must_use]
    pub fn partition(&self) -> Vec<Vec<usize>> {
        let mut groups = self.clusters().into_values().collect::<Vec<_>>();
        groups.sort();
        groups
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Label {
    Unvisited,
    Noise,
    Cluster(u32),
}

/// Clusters `points` with DBSCAN.
///
/// A point is core when at least `min_points` other points lie within
/// `radius` of it. A border point reachable from several clusters joins
/// the first one that reaches it.
///
/// # Errors
///
/// Returns [`ClusterError::InvalidRadius`] if `radius` is not a positive
/// finite number.
pub fn dbscan(
    points: &[Coord<f64>],
    radius: f64,
    min_points: usize,
) -> Result<ClusterAssignment, ClusterError> {
    dbscan_indexed(&NeighborIndex::new(points), radius, min_points)
}

/// [`dbscan`] over an existing index.
///
/// # Errors
///
/// Returns [`ClusterError::InvalidRadius`] if `radius` is not a positive
/// finite number.
pub fn dbscan_indexed(
    index: &NeighborIndex,
    radius: f64,
    min_points: usize,
) -> Result<ClusterAssignment, ClusterError> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(ClusterError::InvalidRadius { radius });
    }

    let mut labels = vec![Label::Unvisited; index.len()];
    let mut cluster_count = 0;

    for seed in 0..index.len() {
        if labels[seed] != Label::Unvisited {
            continue;
        }

        let neighbors = index.neighbors(seed, radius);
        if neighbors.len() < min_points {
            labels[seed] = Label::Noise;
            continue;
        }

        cluster_count += 1;
        let cluster = Label::Cluster(cluster_count);
        labels[seed] = cluster;

        let mut queue = VecDeque::from(neighbors);
        while let Some(point) = queue.pop_front() {
            match labels[point] {
                Label::Cluster(_) => continue,
                // Previously seen as non-core; now a border point.
                Label::Noise => {
                    labels[point] = cluster;
                    continue;
                }
                Label::Unvisited => labels[point] = cluster,
            }

            let reach = index.neighbors(point, radius);
            if reach.len() >= min_points {
                queue.extend(reach);
            }
        }
    }

    Ok(ClusterAssignment {
        labels: labels
            .into_iter()
            .map(|label| match label {
                Label::Cluster(id) => id,
                Label::Unvisited | Label::Noise => NOISE,
            })
            .collect(),
        cluster_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn two_close_points_share_a_cluster() {
        let assignment = dbscan(&[c(0.0, 0.0), c(5.0, 0.0)], 10.0, 1).unwrap();
        assert_eq!(assignment.labels, vec![1, 1]);
        assert_eq!(assignment.cluster_count, 1);
    }

    #[test]
    fn isolated_point_is_noise_and_dropped() {
        let points = [c(0.0, 0.0), c(1.0, 0.0), c(0.0, 1.0), c(500.0, 500.0)];
        let assignment = dbscan(&points, 2.0, 2).unwrap();
        assert_eq!(assignment.labels, vec![1, 1, 1, NOISE]);
        assert_eq!(assignment.noise_count(), 1);
        assert_eq!(assignment.without_noise(), vec![(0, 1), (1, 1), (2, 1)]);
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let assignment = dbscan(&[c(0.0, 0.0), c(30.0, 40.0)], 50.0, 1).unwrap();
        assert_eq!(assignment.cluster_count, 1);
    }

    #[test]
    fn separate_groups_get_separate_ids_in_discovery_order() {
        let points = [
            c(100.0, 0.0),
            c(0.0, 0.0),
            c(101.0, 0.0),
            c(1.0, 0.0),
        ];
        let assignment = dbscan(&points, 2.0, 1).unwrap();
        assert_eq!(assignment.labels, vec![1, 2, 1, 2]);
        assert_eq!(assignment.partition(), vec![vec![0, 2], vec![1, 3]]);
    }

    #[test]
    fn border_point_joins_cluster_but_does_not_expand_it() {
        // 3 is reachable from the core at 2 but has only one neighbour
        // itself, so 4 stays out.
        let points = [
            c(0.0, 0.0),
            c(1.0, 0.0),
            c(2.0, 0.0),
            c(3.5, 0.0),
            c(5.5, 0.0),
        ];
        let assignment = dbscan(&points, 1.5, 2).unwrap();
        assert_eq!(assignment.labels, vec![1, 1, 1, 1, NOISE]);
    }

    #[test]
    fn noise_seen_first_becomes_border_later() {
        // Point 0 is visited first and has one neighbour; it becomes a
        // border point once the core at 1 is expanded.
        let points = [c(0.0, 0.0), c(1.0, 0.0), c(2.0, 0.0), c(2.0, 1.0)];
        let assignment = dbscan(&points, 1.2, 2).unwrap();
        assert_eq!(assignment.labels, vec![1, 1, 1, 1]);
    }

    #[test]
    fn membership_is_reproducible() {
        let points = (0..60)
            .map(|i| {
                let i = f64::from(i);
                c((i * 7.3) % 50.0, (i * 3.1) % 40.0)
            })
            .collect::<Vec<_>>();
        let a = dbscan(&points, 6.0, 3).unwrap();
        let b = dbscan(&points, 6.0, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_radius_is_rejected() {
        assert!(matches!(
            dbscan(&[c(0.0, 0.0)], 0.0, 1),
            Err(ClusterError::InvalidRadius { .. })
        ));
        assert!(dbscan(&[c(0.0, 0.0)], f64::NAN, 1).is_err());
    }

    #[test]
    fn empty_input_has_no_clusters() {
        let assignment = dbscan(&[], 10.0, 3).unwrap();
        assert!(assignment.labels.is_empty());
        assert_eq!(assignment.cluster_count, 0);
    }
}
