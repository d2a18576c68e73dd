//! KD-tree spatial index for `within` / `exwithin` selections.
//!
//! The tree is built over every atom once per context and answers radius
//! queries for any cutoff, so one index serves all distances.

#[derive(Debug)]
struct KdNode {
    point: usize,
    axis: usize,
    split: f64,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
}

#[derive(Debug)]
pub struct KdTree {
    root: Option<Box<KdNode>>,
    points: Vec<[f64; 3]>,
}

impl KdTree {
    pub fn build(points: Vec<[f64; 3]>) -> Self {
        let mut order: Vec<usize> = (0..points.len()).collect();
        let root = Self::build_node(&points, &mut order, 0);
        KdTree { root, points }
    }

    fn build_node(points: &[[f64; 3]], order: &mut [usize], depth: usize) -> Option<Box<KdNode>> {
        if order.is_empty() {
            return None;
        }
        let axis = depth % 3;
        order.sort_unstable_by(|&a, &b| {
            points[a][axis]
                .partial_cmp(&points[b][axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mid = order.len() / 2;
        let point = order[mid];
        let (left, rest) = order.split_at_mut(mid);
        let right = &mut rest[1..];
        Some(Box::new(KdNode {
            point,
            axis,
            split: points[point][axis],
            left: Self::build_node(points, left, depth + 1),
            right: Self::build_node(points, right, depth + 1),
        }))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn point(&self, i: usize) -> &[f64; 3] {
        &self.points[i]
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Visit the index of every point with `||p - center|| <= radius`.
    pub fn for_each_within(&self, center: &[f64; 3], radius: f64, visit: &mut impl FnMut(usize)) {
        if let Some(root) = &self.root {
            self.walk(root, center, radius * radius, radius, visit);
        }
    }

    fn walk(
        &self,
        node: &KdNode,
        center: &[f64; 3],
        radius_sq: f64,
        radius: f64,
        visit: &mut impl FnMut(usize),
    ) {
        let p = &self.points[node.point];
        let dx = p[0] - center[0];
        let dy = p[1] - center[1];
        let dz = p[2] - center[2];
        if dx * dx + dy * dy + dz * dz <= radius_sq {
            visit(node.point);
        }
        let diff = center[node.axis] - node.split;
        let (near, far) = if diff <= 0.0 {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };
        if let Some(child) = near {
            self.walk(child, center, radius_sq, radius, visit);
        }
        if diff.abs() <= radius {
            if let Some(child) = far {
                self.walk(child, center, radius_sq, radius, visit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_within(tree: &KdTree, center: [f64; 3], radius: f64) -> Vec<usize> {
        let mut found = Vec::new();
        tree.for_each_within(&center, radius, &mut |i| found.push(i));
        found.sort_unstable();
        found
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(vec![]);
        assert!(tree.is_empty());
        assert_eq!(collect_within(&tree, [0.0; 3], 10.0), Vec::<usize>::new());
    }

    #[test]
    fn test_line_of_points() {
        let points: Vec<[f64; 3]> = (0..10).map(|i| [i as f64, 0.0, 0.0]).collect();
        let tree = KdTree::build(points);
        assert_eq!(collect_within(&tree, [0.0, 0.0, 0.0], 2.0), vec![0, 1, 2]);
        assert_eq!(collect_within(&tree, [4.5, 0.0, 0.0], 0.6), vec![4, 5]);
        assert_eq!(collect_within(&tree, [100.0, 0.0, 0.0], 1.0), Vec::<usize>::new());
    }

    #[test]
    fn test_radius_boundary_inclusive() {
        let tree = KdTree::build(vec![[0.0; 3], [2.0, 0.0, 0.0]]);
        assert_eq!(collect_within(&tree, [0.0; 3], 2.0), vec![0, 1]);
        assert_eq!(collect_within(&tree, [0.0; 3], 1.999), vec![0]);
    }

    #[test]
    fn test_matches_brute_force() {
        // Deterministic pseudo-random cloud.
        let mut state: u64 = 0x9e3779b97f4a7c15;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as f64 / (1u64 << 31) as f64) * 20.0 - 10.0
        };
        let points: Vec<[f64; 3]> = (0..200).map(|_| [next(), next(), next()]).collect();
        let tree = KdTree::build(points.clone());
        for center in [[0.0, 0.0, 0.0], [5.0, -3.0, 2.0]] {
            for radius in [1.0, 4.0, 9.0] {
                let expected: Vec<usize> = points
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| {
                        let d2 = (p[0] - center[0]).powi(2)
                            + (p[1] - center[1]).powi(2)
                            + (p[2] - center[2]).powi(2);
                        d2 <= radius * radius
                    })
                    .map(|(i, _)| i)
                    .collect();
                assert_eq!(collect_within(&tree, center, radius), expected);
            }
        }
    }
}
