use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use kdforest::{EmulatedDevice, IndexParams, KdTreeDeviceIndex, PointMatrix, SearchParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NUM_POINTS: usize = 50_000;
const NUM_QUERIES: usize = 1_000;
const DIM: usize = 8;
const CHECKS: [usize; 4] = [16, 64, 256, 1024];

fn benchmark_search(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let data: Vec<f64> = (0..NUM_POINTS * DIM).map(|_| rng.r#gen::<f64>()).collect();
    let queries: Vec<f64> = (0..NUM_QUERIES * DIM).map(|_| rng.r#gen::<f64>()).collect();
    let points = PointMatrix::new(&data, NUM_POINTS, DIM).unwrap();
    let queries = PointMatrix::new(&queries, NUM_QUERIES, DIM).unwrap();

    let mut index = KdTreeDeviceIndex::new(IndexParams::with_trees(4).seed(2), EmulatedDevice::new()).unwrap();
    index.build_index(&points).unwrap();

    let mut group = c.benchmark_group(format!("knn10_{}k", NUM_POINTS / 1000));
    group.sample_size(10);
    for &checks in &CHECKS {
        let search = SearchParams { checks, eps: 0.0 };
        group.bench_with_input(BenchmarkId::new("checks", checks), &checks, |b, _| {
            b.iter(|| index.knn_search(black_box(&queries), 10, &search).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_search);
criterion_main!(benches);
