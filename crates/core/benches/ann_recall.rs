//! ANN Benchmark: seeded random unit vectors
//! Measures build rate, Recall@10, QPS and speedup of the HNSW graph against
//! the exact view over the same storage.
//!
//! Usage: cargo bench --bench ann_recall
//! Set RUST_LOG=knn_core=debug to see entry point promotions.

use knn_core::hnsw::normalize;
use knn_core::{HnswConfig, HnswIndex, Index, Item};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DIM: usize = 32;
const TRAIN: usize = 20_000;
const QUERIES: usize = 500;
const K: usize = 10;

fn random_unit_vectors(rng: &mut StdRng, count: usize) -> Vec<Vec<f32>> {
    (0..count)
        .filter_map(|_| {
            let raw: Vec<f32> = (0..DIM).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
            normalize(&raw).ok()
        })
        .collect()
}

/// Compute Recall@k: fraction of exact nearest neighbors found
fn recall_at_k(predicted: &[String], exact: &[String]) -> f64 {
    let truth: HashSet<&String> = exact.iter().collect();
    let found = predicted.iter().filter(|id| truth.contains(id)).count();
    found as f64 / exact.len().max(1) as f64
}

async fn query_all(index: &impl Index, queries: &[Vec<f32>]) -> (Vec<Vec<String>>, Duration) {
    let t0 = Instant::now();
    let mut all = Vec::with_capacity(queries.len());
    for q in queries {
        let ids = index
            .find_nearest(q, K)
            .await
            .unwrap_or_else(|e| panic!("query failed: {e}"))
            .into_iter()
            .map(|r| r.item.id)
            .collect();
        all.push(ids);
    }
    (all, t0.elapsed())
}

async fn run() {
    let mut rng = StdRng::seed_from_u64(42);
    let train = random_unit_vectors(&mut rng, TRAIN);
    let queries = random_unit_vectors(&mut rng, QUERIES);
    println!(" {} vectors x {DIM}d, {} queries", train.len(), queries.len());

    println!();
    println!("--- Index Construction ---");
    let config = HnswConfig {
        ef_construction: 200,
        ..HnswConfig::with_m(16)
    };
    let index = HnswIndex::new(DIM, TRAIN, config).unwrap_or_else(|e| panic!("{e}"));
    let items: Vec<Item> = train
        .iter()
        .enumerate()
        .map(|(i, v)| Item::unversioned(i.to_string(), v.clone()))
        .collect();

    let t0 = Instant::now();
    let added = index
        .add_all(items)
        .await
        .unwrap_or_else(|e| panic!("build failed: {e}"));
    let build_time = t0.elapsed();
    println!(
        "  Build time: {:.2}s ({:.0} inserts/s, {added} items)",
        build_time.as_secs_f64(),
        added as f64 / build_time.as_secs_f64()
    );

    let exact = index.exact_view();
    let (truth, exact_time) = query_all(&exact, &queries).await;
    let exact_qps = queries.len() as f64 / exact_time.as_secs_f64();
    println!("  Exact scan: {exact_qps:.1} QPS");

    println!();
    println!("  ef | Recall@10 |    QPS    | Speedup");
    println!("  ---+-----------+-----------+--------");
    for ef in [10, 20, 40, 80, 160] {
        index.set_ef(ef);
        let (predicted, elapsed) = query_all(&index, &queries).await;
        let recall: f64 = predicted
            .iter()
            .zip(&truth)
            .map(|(p, t)| recall_at_k(p, t))
            .sum::<f64>()
            / queries.len() as f64;
        let qps = queries.len() as f64 / elapsed.as_secs_f64();
        println!(
            "  {:>3} | {:.4}    | {:>9.1} | {:.1}x",
            ef,
            recall,
            qps,
            exact_time.as_secs_f64() / elapsed.as_secs_f64()
        );
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                "knn_core=warn"
                    .parse()
                    .unwrap_or_else(|e| panic!("bad directive: {e}")),
            ),
        )
        .init();

    println!("=== ANN Benchmark: random unit vectors ===");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| panic!("Cannot start runtime: {e}"));
    runtime.block_on(run());

    println!();
    println!("=== Benchmark complete ===");
}
