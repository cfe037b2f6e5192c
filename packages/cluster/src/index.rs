//! R-tree over planar points for fixed-radius neighbour queries.

use geo::Coord;
use rstar::{AABB, PointDistance, RTree, RTreeObject};

/// A point stored in the tree with its position in the input slice.
struct IndexedPoint {
    index: usize,
    position: [f64; 2],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx.mul_add(dx, dy * dy)
    }
}

/// Neighbour lookups over a fixed set of planar points.
///
/// Built once and reused for every radius of a sweep.
pub struct NeighborIndex {
    tree: RTree<IndexedPoint>,
    positions: Vec<[f64; 2]>,
}

impl NeighborIndex {
    /// Indexes `points`; neighbours are reported by their position in this
    /// slice.
    #[must_use]
    pub fn new(points: &[Coord<f64>]) -> Self {
        let positions = points.iter().map(|c| [c.x, c.y]).collect::<Vec<_>>();
        let entries = positions
            .iter()
            .enumerate()
            .map(|(index, position)| IndexedPoint {
                index,
                position: *position,
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
            positions,
        }
    }

    /// Number of indexed points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no points are indexed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Indices of the other points within `radius` of point `index`
    /// (boundary included), in ascending order.
    #[must_use]
    pub fn neighbors(&self, index: usize, radius: f64) -> Vec<usize> {
        let Some(center) = self.positions.get(index) else {
            return Vec::new();
        };

        let mut found = self
            .tree
            .locate_within_distance(*center, radius * radius)
            .map(|entry| entry.index)
            .filter(|&i| i != index)
            .collect::<Vec<_>>();
        found.sort_unstable();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_exclude_self_and_include_boundary() {
        let index = NeighborIndex::new(&[
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 3.0, y: 4.0 },
            Coord { x: 10.0, y: 0.0 },
        ]);
        assert_eq!(index.neighbors(0, 5.0), vec![1]);
        assert_eq!(index.neighbors(1, 5.0), vec![0]);
        assert!(index.neighbors(2, 5.0).is_empty());
        assert_eq!(index.neighbors(1, 100.0), vec![0, 2]);
    }

    #[test]
    fn coincident_points_are_neighbours() {
        let index = NeighborIndex::new(&[Coord { x: 1.0, y: 1.0 }, Coord { x: 1.0, y: 1.0 }]);
        assert_eq!(index.neighbors(0, 0.5), vec![1]);
    }

    #[test]
    fn out_of_range_index_has_no_neighbours() {
        let index = NeighborIndex::new(&[]);
        assert!(index.is_empty());
        assert!(index.neighbors(3, 1.0).is_empty());
    }
}
