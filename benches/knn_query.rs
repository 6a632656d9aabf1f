#[macro_use]
extern crate bencher;
extern crate behavior2vec;

use bencher::Bencher;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use behavior2vec::knn::KdIndex;

benchmark_group!(benches, kd_build, kd_query_top20);
benchmark_main!(benches);

const NUM_POINTS: usize = 10_000;
const DIM: usize = 32;
const TOP_K: usize = 20;

fn random_snapshot() -> (Vec<String>, Vec<Vec<f32>>) {
    let mut rng = Pcg64::seed_from_u64(7);
    let labels = (0..NUM_POINTS).map(|i| format!("{:06}", i)).collect();
    let points = (0..NUM_POINTS)
        .map(|_| (0..DIM).map(|_| rng.gen::<f32>()).collect())
        .collect();
    (labels, points)
}

fn kd_build(bench: &mut Bencher) {
    let (labels, points) = random_snapshot();
    bench.iter(|| KdIndex::build(labels.clone(), points.clone()).unwrap())
}

fn kd_query_top20(bench: &mut Bencher) {
    let (labels, points) = random_snapshot();
    let index = KdIndex::build(labels, points).unwrap();
    let mut rng = Pcg64::seed_from_u64(13);
    let query: Vec<f32> = (0..DIM).map(|_| rng.gen::<f32>()).collect();

    bench.iter(|| index.query(&query, TOP_K).unwrap())
}
