use kdforest::{IndexParams, KdForest, PointMatrix, forest_capacity};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_points(count: usize, dim: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count * dim).map(|_| rng.gen_range(-50.0..50.0)).collect()
}

/// Point ids reachable from `ordinal`.
fn subtree_points(forest: &KdForest, ordinal: u32) -> Vec<u32> {
    let mut out = Vec::new();
    let mut stack = vec![ordinal];
    while let Some(o) = stack.pop() {
        let node = forest.node(o).expect("ordinal inside arena");
        match node.children() {
            Some((a, b)) => {
                stack.push(a);
                stack.push(b);
            }
            None => out.push(node.divfeat),
        }
    }
    out
}

fn assert_leaf_property(forest: &KdForest) {
    let n = forest.point_count() as u32;
    for node in forest.nodes() {
        if node.is_leaf() {
            assert_eq!(node.child1, kdforest::NO_CHILD);
            assert_eq!(node.child2, kdforest::NO_CHILD);
            assert!(node.divfeat < n, "leaf point {} out of {}", node.divfeat, n);
        }
    }
}

fn assert_partition(forest: &KdForest, data: &[f64], dim: usize) {
    for (ordinal, node) in forest.nodes().iter().enumerate() {
        let Some((left, right)) = node.children() else { continue };
        let d = node.split_dim().unwrap();
        let v = node.split_value().unwrap();
        for p in subtree_points(forest, left) {
            let x = data[p as usize * dim + d];
            assert!(x <= v, "node {}: left point {} has {} > {}", ordinal, p, x, v);
        }
        for p in subtree_points(forest, right) {
            let x = data[p as usize * dim + d];
            assert!(x >= v, "node {}: right point {} has {} < {}", ordinal, p, x, v);
        }
    }
}

fn assert_coverage(forest: &KdForest) {
    let expected: Vec<u32> = (0..forest.point_count() as u32).collect();
    for tree in 0..forest.tree_count() {
        let mut leaves = forest.leaves(tree);
        leaves.sort_unstable();
        assert_eq!(leaves, expected, "tree {} does not cover every point once", tree);
    }
}

#[test]
fn test_leaf_and_partition_properties() {
    for &(count, dim) in &[(300, 3), (257, 8), (64, 1)] {
        let data = random_points(count, dim, count as u64);
        let points = PointMatrix::new(&data, count, dim).unwrap();
        let forest = KdForest::build(&points, &IndexParams::with_trees(3).seed(42)).unwrap();

        assert_leaf_property(&forest);
        assert_partition(&forest, &data, dim);
        assert_coverage(&forest);
    }
}

#[test]
fn test_partition_with_duplicate_coordinates() {
    // Few distinct values per axis, so many points tie with the threshold.
    let mut rng = StdRng::seed_from_u64(3);
    let dim = 4;
    let count = 200;
    let data: Vec<f64> = (0..count * dim).map(|_| rng.gen_range(0..3) as f64).collect();
    let points = PointMatrix::new(&data, count, dim).unwrap();
    let forest = KdForest::build(&points, &IndexParams::with_trees(2).seed(8)).unwrap();

    assert_leaf_property(&forest);
    assert_partition(&forest, &data, dim);
    assert_coverage(&forest);
}

#[test]
fn test_capacity_bound() {
    for &(count, trees) in &[(1, 1), (2, 4), (3, 2), (100, 5), (1025, 2)] {
        let data = random_points(count, 2, 17);
        let points = PointMatrix::new(&data, count, 2).unwrap();
        let forest = KdForest::build(&points, &IndexParams::with_trees(trees).seed(1)).unwrap();

        let capacity = forest_capacity(count, trees).unwrap();
        assert_eq!(forest.stats().capacity, capacity);
        assert_eq!(forest.node_count(), trees * (2 * count - 1));
        assert!(forest.node_count() <= capacity);
    }
}

#[test]
fn test_identical_points_terminate() {
    let count = 1000;
    let data = vec![2.5f32; count * 3];
    let points = PointMatrix::new(&data, count, 3).unwrap();
    let forest = KdForest::build(&points, &IndexParams::with_trees(2).seed(4)).unwrap();

    assert_coverage(&forest);
    // Midpoint splits only: a perfectly balanced depth.
    assert_eq!(forest.depth(0), 10);
    assert_eq!(forest.depth(1), 10);
}

#[test]
fn test_forest_diversity() {
    let count = 1000;
    let dim = 8;
    let data = random_points(count, dim, 99);
    let points = PointMatrix::new(&data, count, dim).unwrap();
    let forest = KdForest::build(&points, &IndexParams::with_trees(3).seed(2024)).unwrap();

    let splits: Vec<(usize, f64)> = forest
        .roots()
        .iter()
        .map(|&r| {
            let node = forest.node(r).unwrap();
            (node.split_dim().unwrap(), node.split_value().unwrap())
        })
        .collect();
    assert!(
        splits[0] != splits[1] || splits[1] != splits[2],
        "all roots split identically: {:?}",
        splits
    );
}

#[test]
fn test_same_seed_same_forest() {
    let data = random_points(150, 6, 5);
    let points = PointMatrix::new(&data, 150, 6).unwrap();
    let params = IndexParams::with_trees(2).seed(77);
    let a = KdForest::build(&points, &params).unwrap();
    let b = KdForest::build(&points, &params).unwrap();
    assert_eq!(a.nodes(), b.nodes());
    assert_eq!(a.roots(), b.roots());
}

#[test]
fn test_parallel_build_properties() {
    let count = 500;
    let dim = 7;
    let data = random_points(count, dim, 12);
    let points = PointMatrix::new(&data, count, dim).unwrap();
    let forest = KdForest::build_parallel(&points, &IndexParams::with_trees(6).seed(3)).unwrap();

    assert_eq!(forest.tree_count(), 6);
    assert!(Some(forest.node_count()) <= forest_capacity(count, 6));
    assert_leaf_property(&forest);
    assert_partition(&forest, &data, dim);
    assert_coverage(&forest);
}

#[test]
fn test_integer_elements() {
    let data: Vec<u8> = (0..90u8).collect();
    let points = PointMatrix::new(&data, 30, 3).unwrap();
    let forest = KdForest::build(&points, &IndexParams::default().seed(0)).unwrap();
    assert_coverage(&forest);
    let as_f64: Vec<f64> = data.iter().map(|&v| v as f64).collect();
    assert_partition(&forest, &as_f64, 3);
}
