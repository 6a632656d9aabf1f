use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{B2vError, Result};
use crate::knn::Neighbor;

struct KdNode {
    point: u32,
    left: Option<u32>,
    right: Option<u32>,
}

/// Immutable exact nearest-neighbor index over a snapshot of labeled vectors,
/// stored as a balanced kd-tree. The snapshot is frozen at build time; when
/// the underlying vectors change, a new index is built instead of mutating
/// this one.
pub struct KdIndex {
    labels: Vec<String>,
    points: Vec<Vec<f32>>,
    nodes: Vec<KdNode>,
    root: Option<u32>,
    dim: usize,
}

impl KdIndex {
    /// Builds the tree by recursive median splits. Entries are ordered by
    /// (coordinate, label) on every level, so identical input snapshots
    /// always produce identical trees.
    pub fn build(labels: Vec<String>, points: Vec<Vec<f32>>) -> Result<Self> {
        assert_eq!(labels.len(), points.len());
        let dim = points.first().map(|point| point.len()).unwrap_or(0);
        if dim == 0 && !points.is_empty() {
            return Err(B2vError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        for point in points.iter() {
            if point.len() != dim {
                return Err(B2vError::DimensionMismatch {
                    expected: dim,
                    actual: point.len(),
                });
            }
        }

        let mut nodes = Vec::with_capacity(points.len());
        let mut entry_order: Vec<usize> = (0..points.len()).collect();
        let root = build_subtree(&labels, &points, dim, &mut entry_order, 0, &mut nodes);

        Ok(KdIndex {
            labels,
            points,
            nodes,
            root,
            dim,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the `k` nearest entries by Euclidean distance, ascending, with
    /// distance ties broken by ascending label. Asking for more neighbors
    /// than the index holds is an error rather than a silent truncation.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(B2vError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        if k > self.len() {
            return Err(B2vError::InsufficientNeighbors {
                requested: k,
                available: self.len(),
            });
        }

        // Max-heap of the best k candidates seen so far, carrying squared
        // distances; the heap top is the current worst under the
        // (distance, label) order.
        let mut candidates: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k);
        if k > 0 {
            self.search(self.root, query, k, 0, &mut candidates);
        }

        let mut neighbors = candidates.into_sorted_vec();
        for neighbor in neighbors.iter_mut() {
            neighbor.distance = neighbor.distance.sqrt();
        }
        Ok(neighbors)
    }

    fn search(
        &self,
        node_id: Option<u32>,
        query: &[f32],
        k: usize,
        depth: usize,
        candidates: &mut BinaryHeap<Neighbor>,
    ) {
        let node = match node_id {
            Some(node_id) => &self.nodes[node_id as usize],
            None => return,
        };
        let point_idx = node.point as usize;

        let candidate = Neighbor::new(
            self.labels[point_idx].clone(),
            squared_distance(query, &self.points[point_idx]),
        );
        if candidates.len() < k {
            candidates.push(candidate);
        } else {
            let mut worst = candidates.peek_mut().unwrap();
            if candidate < *worst {
                *worst = candidate;
            }
        }

        let axis = depth % self.dim;
        let axis_diff = (query[axis] - self.points[point_idx][axis]) as f64;
        let (near, far) = if axis_diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        self.search(near, query, k, depth + 1, candidates);

        // The far side can still hold a winner when the splitting plane is
        // within the current worst distance. Equal distances must descend
        // too, since the label tie-break can prefer a far-side entry.
        let visit_far = candidates.len() < k
            || axis_diff * axis_diff <= candidates.peek().unwrap().distance;
        if visit_far {
            self.search(far, query, k, depth + 1, candidates);
        }
    }
}

fn build_subtree(
    labels: &[String],
    points: &[Vec<f32>],
    dim: usize,
    entry_order: &mut [usize],
    depth: usize,
    nodes: &mut Vec<KdNode>,
) -> Option<u32> {
    if entry_order.is_empty() {
        return None;
    }

    let axis = depth % dim;
    entry_order.sort_unstable_by(|&a, &b| {
        match points[a][axis].partial_cmp(&points[b][axis]) {
            Some(Ordering::Less) => Ordering::Less,
            Some(Ordering::Greater) => Ordering::Greater,
            _ => labels[a].cmp(&labels[b]),
        }
    });

    let mid = entry_order.len() / 2;
    let point = entry_order[mid] as u32;
    let (left_entries, rest) = entry_order.split_at_mut(mid);
    let right_entries = &mut rest[1..];

    let node_id = nodes.len() as u32;
    nodes.push(KdNode {
        point,
        left: None,
        right: None,
    });
    let left = build_subtree(labels, points, dim, left_entries, depth + 1, nodes);
    let right = build_subtree(labels, points, dim, right_entries, depth + 1, nodes);
    nodes[node_id as usize].left = left;
    nodes[node_id as usize].right = right;

    Some(node_id)
}

fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = (x - y) as f64;
            diff * diff
        })
        .sum()
}

#[cfg(test)]
mod kd_index_test {
    use super::*;
    use float_cmp::approx_eq;

    fn index_of(entries: &[(&str, Vec<f32>)]) -> KdIndex {
        let labels = entries.iter().map(|(label, _)| label.to_string()).collect();
        let points = entries.iter().map(|(_, point)| point.clone()).collect();
        KdIndex::build(labels, points).unwrap()
    }

    #[test]
    fn should_find_exact_nearest_neighbors() {
        let index = index_of(&[
            ("a", vec![0.0, 0.0]),
            ("b", vec![1.0, 0.0]),
            ("c", vec![0.0, 3.0]),
            ("d", vec![5.0, 5.0]),
        ]);

        let neighbors = index.query(&[0.1, 0.0], 3).unwrap();
        assert_eq!(
            vec!["a", "b", "c"],
            neighbors.iter().map(|n| n.label.as_str()).collect::<Vec<_>>()
        );
        assert!(approx_eq!(f64, 0.1, neighbors[0].distance, epsilon = 1e-9));
        assert!(approx_eq!(f64, 0.9, neighbors[1].distance, epsilon = 1e-9));
    }

    #[test]
    fn should_match_linear_scan_on_larger_input() {
        // Deterministic pseudo-random points; compare tree answers against a
        // brute-force scan.
        let mut state = 42_u64;
        let mut next_coord = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as f32) / (u32::MAX as f32)
        };

        let mut labels = Vec::new();
        let mut points = Vec::new();
        for i in 0..200 {
            labels.push(format!("{:03}", i));
            points.push(vec![next_coord(), next_coord(), next_coord()]);
        }
        let index = KdIndex::build(labels.clone(), points.clone()).unwrap();

        let query = vec![0.5_f32, 0.5, 0.5];
        let k = 10;

        let mut expected: Vec<Neighbor> = labels
            .iter()
            .zip(points.iter())
            .map(|(label, point)| {
                Neighbor::new(label.clone(), squared_distance(&query, point).sqrt())
            })
            .collect();
        expected.sort();
        expected.truncate(k);

        let actual = index.query(&query, k).unwrap();
        for (expected_neighbor, actual_neighbor) in expected.iter().zip(actual.iter()) {
            assert_eq!(expected_neighbor.label, actual_neighbor.label);
            assert!(approx_eq!(
                f64,
                expected_neighbor.distance,
                actual_neighbor.distance,
                epsilon = 1e-9
            ));
        }
    }

    #[test]
    fn should_break_distance_ties_by_label() {
        let index = index_of(&[
            ("d", vec![1.0, 0.0]),
            ("b", vec![0.0, 1.0]),
            ("c", vec![-1.0, 0.0]),
            ("a", vec![0.0, -1.0]),
        ]);

        let neighbors = index.query(&[0.0, 0.0], 4).unwrap();
        assert_eq!(
            vec!["a", "b", "c", "d"],
            neighbors.iter().map(|n| n.label.as_str()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn should_keep_tied_entries_with_smaller_labels() {
        // Five entries at two distinct distances; with k=3 the tie at the
        // boundary must resolve to the smaller labels.
        let index = index_of(&[
            ("e", vec![1.0, 0.0]),
            ("d", vec![0.0, 1.0]),
            ("c", vec![-1.0, 0.0]),
            ("b", vec![2.0, 0.0]),
            ("a", vec![0.0, 0.0]),
        ]);

        let neighbors = index.query(&[0.0, 0.0], 3).unwrap();
        assert_eq!(
            vec!["a", "c", "d"],
            neighbors.iter().map(|n| n.label.as_str()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn should_fail_when_k_exceeds_index_size() {
        let index = index_of(&[("a", vec![0.0]), ("b", vec![1.0])]);
        assert_eq!(
            Err(B2vError::InsufficientNeighbors {
                requested: 3,
                available: 2
            }),
            index.query(&[0.0], 3)
        );
    }

    #[test]
    fn should_reject_query_of_wrong_dimension() {
        let index = index_of(&[("a", vec![0.0, 0.0])]);
        assert_eq!(
            Err(B2vError::DimensionMismatch {
                expected: 2,
                actual: 3
            }),
            index.query(&[0.0, 0.0, 0.0], 1)
        );
    }
}
