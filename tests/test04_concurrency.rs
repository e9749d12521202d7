use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use sql_statement_pool::prelude::*;
use sql_statement_pool::test_utils::MockProvider;

const SQL: &str = "SELECT ?, ?";

fn echo_pair(
    stmt: &mut PreparedStatement,
    (task, round): (i64, i64),
) -> BoxFuture<'_, Result<(i64, i64), DbError>> {
    Box::pin(async move {
        stmt.set_i64(1, task)?;
        stmt.set_i64(2, round)?;
        let mut rows = stmt.execute_query().await?;
        let mut seen = (-1, -1);
        if rows.next().await? {
            seen = (
                rows.get_i64(1)?.unwrap_or(-1),
                rows.get_i64(2)?.unwrap_or(-1),
            );
        }
        rows.close().await?;
        Ok::<_, DbError>(seen)
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_checkout_has_a_single_owner() -> Result<(), DbError> {
    let mock = MockProvider::start_with(HousekeeperConfig::new().with_workers(4))?;
    let pool = StatementPool::new(mock.provider(), SQL);
    let owners: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));

    let mut tasks = Vec::new();
    for task in 0..16_i64 {
        let pool = pool.clone();
        let owners = Arc::clone(&owners);
        tasks.push(tokio::spawn(async move {
            for round in 0..25_i64 {
                let mut stmt = pool.acquire().await?;
                let id = stmt.id();
                assert!(
                    owners.lock().unwrap().insert(id),
                    "statement {id} handed to two tasks at once"
                );

                stmt.set_i64(1, task)?;
                stmt.set_i64(2, round)?;
                let mut rows = stmt.execute_query().await?;
                assert!(rows.next().await?);
                assert_eq!(rows.get_i64(1)?, Some(task));
                assert_eq!(rows.get_i64(2)?, Some(round));
                rows.close().await?;

                owners.lock().unwrap().remove(&id);
                stmt.close();
                tokio::task::yield_now().await;
            }
            Ok::<_, DbError>(())
        }));
    }
    for task in tasks {
        task.await.expect("worker task panicked")?;
    }
    mock.settle().await;

    assert!(owners.lock().unwrap().is_empty());
    assert!(pool.idle_count() <= mock.links_opened());
    assert!(mock.links_opened() <= 16 * 25);
    assert_eq!(mock.open_links().len(), pool.idle_count());
    for link in mock.open_links() {
        assert_eq!(mock.open_statements(link), 1);
    }

    pool.shutdown().await;
    assert!(mock.open_links().is_empty());
    assert!(mock.violations().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_wrappers_keep_their_parameters_apart() -> Result<(), DbError> {
    let mock = MockProvider::start()?;
    let wrapper = Arc::new(PreparedStatementWrapper::new(
        "[pair]",
        mock.provider(),
        echo_pair,
    ));

    let mut tasks = Vec::new();
    for task in 0..32_i64 {
        let wrapper = Arc::clone(&wrapper);
        tasks.push(tokio::spawn(async move {
            let mut results = Vec::new();
            for round in 0..4_i64 {
                results.push((round, wrapper.execute(SQL, (task, round)).await?));
            }
            Ok::<_, DbError>((task, results))
        }));
    }
    for task in tasks {
        let (task, results) = task.await.expect("worker task panicked")?;
        for (round, seen) in results {
            assert_eq!(seen, (task, round));
        }
    }

    assert_eq!(mock.links_opened(), 32 * 4);
    for link in mock.link_ids() {
        assert_eq!(mock.commit_count(link), 1);
        assert_eq!(mock.close_count(link), 1);
        assert_eq!(mock.open_statements(link), 0);
    }
    assert!(mock.open_links().is_empty());
    assert!(mock.violations().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_and_wrappers_share_a_provider() -> Result<(), DbError> {
    let mock = MockProvider::start()?;
    let provider = mock.provider();
    let pool = StatementPool::new(Arc::clone(&provider), SQL);
    let wrapper = Arc::new(PreparedStatementWrapper::new(
        "[pair]",
        Arc::clone(&provider),
        echo_pair,
    ));

    let pooled = {
        let pool = pool.clone();
        tokio::spawn(async move {
            for round in 0..50_i64 {
                let mut stmt = pool.acquire().await?;
                stmt.set_i64(1, 1)?;
                stmt.set_i64(2, round)?;
                stmt.execute_query().await?.close().await?;
                stmt.close();
            }
            Ok::<_, DbError>(())
        })
    };
    let wrapped = {
        let wrapper = Arc::clone(&wrapper);
        tokio::spawn(async move {
            for round in 0..50_i64 {
                assert_eq!(wrapper.execute(SQL, (2, round)).await?, (2, round));
            }
            Ok::<_, DbError>(())
        })
    };
    pooled.await.expect("pool task panicked")?;
    wrapped.await.expect("wrapper task panicked")?;
    mock.settle().await;

    pool.shutdown().await;
    assert!(mock.open_links().is_empty());
    assert!(mock.violations().is_empty());
    Ok(())
}
