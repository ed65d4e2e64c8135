use std::time::Duration;
use tempfile::TempDir;
use thin_core::{ConnectionPool, DbError, PoolStatus, StoreConfig};

fn open_pool(dir: &TempDir, size: usize) -> ConnectionPool {
    let config = StoreConfig::new(dir.path().join("thin.db"))
        .with_pool_size(size)
        .with_acquire_timeout(Duration::from_millis(100));
    ConnectionPool::open(&config).unwrap()
}

#[test]
fn open_bootstraps_one_idle_connection() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir, 3);

    assert_eq!(
        pool.status(),
        PoolStatus {
            open: 1,
            idle: 1,
            max: 3,
            closed: false,
        }
    );
}

#[test]
fn dropped_connection_returns_to_pool_and_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir, 2);

    {
        let conn = pool.acquire().unwrap();
        conn.execute_batch("SELECT 1;").unwrap();
        assert_eq!(pool.status().idle, 0);
    }
    assert_eq!(pool.status().idle, 1);

    let _again = pool.acquire().unwrap();
    assert_eq!(pool.status().open, 1);
}

#[test]
fn pool_grows_up_to_its_limit_then_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir, 2);

    let first = pool.acquire().unwrap();
    let second = pool.acquire().unwrap();
    assert_eq!(pool.status().open, 2);

    let err = pool.acquire().err().expect("third acquire should time out");
    assert!(matches!(err, DbError::PoolTimeout { .. }));

    drop(first);
    let third = pool.acquire().unwrap();
    drop(second);
    drop(third);
    assert_eq!(pool.status().idle, 2);
}

#[test]
fn waiting_acquire_is_served_when_a_connection_returns() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path().join("thin.db"))
        .with_pool_size(1)
        .with_acquire_timeout(Duration::from_secs(5));
    let pool = ConnectionPool::open(&config).unwrap();

    let held = pool.acquire().unwrap();
    let waiter = {
        let pool = pool.clone();
        std::thread::spawn(move || pool.acquire().map(|_| ()))
    };
    std::thread::sleep(Duration::from_millis(50));
    drop(held);

    waiter.join().unwrap().unwrap();
    assert_eq!(pool.status().idle, 1);
}

#[test]
fn connection_left_in_transaction_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir, 2);

    {
        let conn = pool.acquire().unwrap();
        conn.execute_batch("BEGIN;").unwrap();
    }

    let status = pool.status();
    assert_eq!(status.open, 0);
    assert_eq!(status.idle, 0);
    pool.acquire().unwrap();
}

#[test]
fn shutdown_rejects_new_acquisitions_and_closes_returned_connections() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir, 2);

    let held = pool.acquire().unwrap();
    pool.acquire().map(drop).unwrap();
    pool.shutdown();

    assert!(matches!(pool.acquire(), Err(DbError::PoolClosed)));
    assert_eq!(pool.status().open, 1);

    drop(held);
    let status = pool.status();
    assert_eq!(status.open, 0);
    assert!(status.closed);

    pool.shutdown();
}
