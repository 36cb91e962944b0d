// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

// Greedy degree-bounded nearest-neighbor pairing of blob centers, used to
// draw trail lines between nearby detections.

// A candidate pairing of centers `i` < `j`.
#[derive(Clone, Copy, Debug)]
struct ProximityEdge {
    distance_sq: u128,
    i: usize,
    j: usize,
}

/// Pairs up `centers` closest-first. A pair is accepted only while both of
/// its endpoints have fewer than `max_degree` accepted pairs; rejected pairs
/// are never reconsidered. Equal distances are resolved in enumeration order
/// ((0,1), (0,2), .., (1,2), ..), so the output is deterministic.
///
/// Returns the accepted (i, j) index pairs, i < j, in acceptance order.
///
/// This is O(n^2 log n) in the number of centers; it is meant for the tens of
/// blobs found in a frame. The scan is inherently sequential since each
/// decision depends on the degrees left by earlier ones.
pub fn connect(centers: &[(i32, i32)], max_degree: usize) -> Vec<(usize, usize)> {
    let n = centers.len();
    if n < 2 || max_degree == 0 {
        return Vec::new();
    }

    let mut candidates = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        let (xi, yi) = centers[i];
        for j in i + 1..n {
            let (xj, yj) = centers[j];
            let dx = (xi as i64 - xj as i64).unsigned_abs() as u128;
            let dy = (yi as i64 - yj as i64).unsigned_abs() as u128;
            candidates.push(ProximityEdge{distance_sq: dx * dx + dy * dy, i, j});
        }
    }
    // Stable: ties keep enumeration order.
    candidates.sort_by_key(|edge| edge.distance_sq);

    let mut degree = vec![0_usize; n];
    let mut edges = Vec::new();
    for edge in &candidates {
        if degree[edge.i] >= max_degree || degree[edge.j] >= max_degree {
            continue;
        }
        degree[edge.i] += 1;
        degree[edge.j] += 1;
        edges.push((edge.i, edge.j));
    }
    edges
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use super::*;

    fn degrees(n: usize, edges: &[(usize, usize)]) -> Vec<usize> {
        let mut degree = vec![0; n];
        for (i, j) in edges {
            degree[*i] += 1;
            degree[*j] += 1;
        }
        degree
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(connect(&[], 2).is_empty());
        assert!(connect(&[(3, 4)], 2).is_empty());
        assert!(connect(&[(0, 0), (1, 1), (5, 5)], 0).is_empty());
    }

    #[test]
    fn test_two_pairs_then_cross_pairs() {
        let centers = [(0, 0), (1, 0), (0, 5), (1, 5)];
        let edges = connect(&centers, 2);
        assert_eq!(edges, vec![(0, 1), (2, 3), (0, 2), (1, 3)]);
        assert_eq!(degrees(4, &edges), vec![2, 2, 2, 2]);

        // With degree 1 only the two short pairs form.
        assert_eq!(connect(&centers, 1), vec![(0, 1), (2, 3)]);
    }

    #[test]
    fn test_chain() {
        // Points on a line: degree 2 links neighbors into a chain, and the
        // two chain ends still have room, so the longest pair closes it.
        let centers = [(0, 0), (10, 0), (3, 0), (6, 0)];
        let edges = connect(&centers, 2);
        assert_eq!(edges, vec![(0, 2), (2, 3), (1, 3), (0, 1)]);
        assert_eq!(degrees(4, &edges), vec![2, 2, 2, 2]);
    }

    #[test]
    fn test_ties_follow_enumeration_order() {
        // Square: all four sides have the same length.
        let centers = [(0, 0), (4, 0), (0, 4), (4, 4)];
        assert_eq!(connect(&centers, 1), vec![(0, 1), (2, 3)]);
        assert_eq!(connect(&centers, 2), vec![(0, 1), (0, 2), (1, 3), (2, 3)]);
        // Coincident points are a zero-length pair.
        assert_eq!(connect(&[(7, 7), (1, 1), (7, 7)], 1), vec![(0, 2)]);
    }

    #[test]
    fn test_large_coordinates_do_not_overflow() {
        let centers = [(i32::MIN, i32::MIN), (i32::MAX, i32::MAX), (0, 0)];
        let edges = connect(&centers, 1);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0], (1, 2));
    }

    #[test]
    fn test_degree_invariant_and_determinism() {
        let mut rng = StdRng::seed_from_u64(42);
        for trial in 0..50 {
            let n = rng.gen_range(0..40);
            let centers: Vec<(i32, i32)> = (0..n)
                .map(|_| (rng.gen_range(0..64), rng.gen_range(0..48)))
                .collect();
            let max_degree = trial % 5;
            let edges = connect(&centers, max_degree);
            for d in degrees(n, &edges) {
                assert!(d <= max_degree);
            }
            for (i, j) in &edges {
                assert!(i < j && *j < n);
            }
            assert_eq!(edges, connect(&centers, max_degree));
        }
    }

    #[test]
    fn test_edges_are_sorted_by_distance() {
        let mut rng = StdRng::seed_from_u64(7);
        let centers: Vec<(i32, i32)> = (0..25)
            .map(|_| (rng.gen_range(-100..100), rng.gen_range(-100..100)))
            .collect();
        let edges = connect(&centers, 3);
        let distance_sq = |(i, j): (usize, usize)| {
            let dx = (centers[i].0 - centers[j].0) as i64;
            let dy = (centers[i].1 - centers[j].1) as i64;
            dx * dx + dy * dy
        };
        for pair in edges.windows(2) {
            assert!(distance_sq(pair[0]) <= distance_sq(pair[1]));
        }
    }

}  // mod tests.
