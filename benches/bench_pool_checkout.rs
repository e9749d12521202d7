//! Pooled prepared statements against a wrapper that opens, prepares, commits and closes a
//! fresh link for every lookup. Both run over the in-memory mock provider, so the numbers
//! isolate the crate's own overhead: checkout, housekeeping hand-off and transaction
//! bookkeeping.
//!
//! `BENCH_LOOKUPS` and `BENCH_CONCURRENCY` override the workload size.

use std::future::Future;
use std::hint::black_box;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use criterion::measurement::WallTime;
use criterion::{BenchmarkGroup, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::future::BoxFuture;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use sql_statement_pool::prelude::*;
use sql_statement_pool::test_utils::MockProvider;
use tokio::runtime::Runtime;
use tokio::task::JoinSet;

const LOOKUP: &str = "SELECT ?";

static RUNTIME: LazyLock<Runtime> = LazyLock::new(|| Runtime::new().expect("tokio runtime"));

static MOCK: LazyLock<Arc<MockProvider>> = LazyLock::new(|| {
    RUNTIME
        .block_on(async { MockProvider::start_with(HousekeeperConfig::new().with_workers(4)) })
        .expect("mock provider")
});

/// Lookup keys, shuffled with a fixed seed so runs are comparable.
static KEYS: LazyLock<Arc<[i64]>> = LazyLock::new(|| {
    let count = env_usize("BENCH_LOOKUPS", 1024);
    let mut keys: Vec<i64> = (1..=count).map(|k| k as i64).collect();
    keys.shuffle(&mut ChaCha8Rng::seed_from_u64(0x5eed));
    keys.into()
});

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
        .max(1)
}

async fn first_value(mut rows: ResultCursor, key: i64) -> Result<i64, DbError> {
    let found = if rows.next().await? { rows.get_i64(1)? } else { None };
    rows.close().await?;
    found.ok_or_else(|| DbError::other(format!("no row for key {key}")))
}

fn lookup(stmt: &mut PreparedStatement, key: i64) -> BoxFuture<'_, Result<i64, DbError>> {
    Box::pin(async move {
        stmt.set_i64(1, key)?;
        first_value(stmt.execute_query().await?, key).await
    })
}

/// Split `keys` across `workers` tasks, each running `work` once per key in its slice.
async fn fan_out<W, Fut>(keys: &Arc<[i64]>, workers: usize, work: W) -> Result<(), DbError>
where
    W: Fn(i64) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<i64, DbError>> + Send + 'static,
{
    let per_worker = keys.len().div_ceil(workers);
    let mut tasks = JoinSet::new();
    for start in (0..keys.len()).step_by(per_worker) {
        let keys = Arc::clone(keys);
        let work = work.clone();
        tasks.spawn(async move {
            for &key in &keys[start..(start + per_worker).min(keys.len())] {
                black_box(work(key).await?);
            }
            Ok::<_, DbError>(())
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|err| DbError::other(format!("bench worker died: {err}")))??;
    }
    Ok(())
}

fn bench_case<W, Fut>(group: &mut BenchmarkGroup<'_, WallTime>, name: &str, workers: usize, work: W)
where
    W: Fn(i64) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<i64, DbError>> + Send + 'static,
{
    group.bench_function(BenchmarkId::new(name, workers), |b| {
        b.to_async(&*RUNTIME).iter_custom(|iters| {
            let work = work.clone();
            async move {
                let mut elapsed = Duration::ZERO;
                for _ in 0..iters {
                    let started = Instant::now();
                    fan_out(&KEYS, workers, work.clone()).await.expect("bench run");
                    elapsed += started.elapsed();
                }
                elapsed
            }
        });
    });
}

fn pool_checkout(c: &mut Criterion) {
    let workers = env_usize("BENCH_CONCURRENCY", 8);
    let mut group = c.benchmark_group("pool_checkout");
    group.throughput(Throughput::Elements(KEYS.len() as u64));

    let pool = StatementPool::new(MOCK.provider(), LOOKUP);
    bench_case(&mut group, "pooled_statement", workers, move |key| {
        let pool = pool.clone();
        async move {
            let mut stmt = pool.acquire().await?;
            stmt.set_i64(1, key)?;
            let found = first_value(stmt.execute_query().await?, key).await;
            stmt.close();
            found
        }
    });

    let wrapper = Arc::new(PreparedStatementWrapper::new("[bench]", MOCK.provider(), lookup));
    bench_case(&mut group, "fresh_link_wrapper", workers, move |key| {
        let wrapper = Arc::clone(&wrapper);
        async move { wrapper.execute(LOOKUP, key).await }
    });

    group.finish();
}

criterion_group!(benches, pool_checkout);
criterion_main!(benches);
