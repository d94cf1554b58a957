mod common;

use common::{FAIL, HANG, corrupt, page, pages, start_pool, texts};
use oar_ocr_pool::prelude::*;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn config() -> PoolConfig {
    PoolConfig::new().with_batch_pause_ms(0)
}

#[test]
fn all_files_succeed_in_input_order() {
    let (pool, tally) = start_pool(config(), 4, Duration::from_millis(20));

    let mut events = Vec::new();
    let outcomes = pool
        .process_many_with_progress(pages(8), |e| events.push(e.clone()))
        .unwrap();

    assert_eq!(outcomes.len(), 8);
    assert!(outcomes.iter().all(TaskOutcome::success));
    let expected: Vec<Option<String>> = (0..8).map(|i| Some(format!("page-{i}"))).collect();
    assert_eq!(texts(&outcomes), expected);
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.file_name, format!("page_{i}.png"));
    }

    assert_eq!(events.len(), 8);
    assert_eq!(events.last().map(|e| e.completed), Some(8));
    assert!(events.iter().all(|e| e.total == 8 && e.total_batches == 1));
    assert!(tally.peak() <= 4);

    let stats = pool.stats();
    assert_eq!(stats.counters.total_processed, 8);
    assert_eq!(stats.counters.total_errors, 0);
    assert_eq!(stats.success_rate, 100.0);
    assert_eq!(stats.total_workers, 4);
    assert_eq!(stats.available_workers, 4);
    assert_eq!(stats.busy_workers, 0);
    assert_eq!(stats.queued_tasks, 0);
}

#[test]
fn batched_run_reports_every_file_with_batch_indices() {
    let (pool, _tally) = start_pool(config().with_batch_size(2), 2, Duration::from_millis(5));

    let mut events = Vec::new();
    let outcomes = pool
        .process_batched(pages(5), |e| events.push(e.clone()))
        .unwrap();

    assert_eq!(outcomes.len(), 5);
    assert_eq!(events.len(), 5);
    assert!(events.iter().all(|e| e.total_batches == 3 && e.total == 5));
    let batch_indices: Vec<usize> = events.iter().map(|e| e.batch_index).collect();
    assert_eq!(batch_indices, vec![0, 0, 1, 1, 2]);
    let completed: Vec<usize> = events.iter().map(|e| e.completed).collect();
    assert_eq!(completed, vec![1, 2, 3, 4, 5]);

    // One cleanup pass between each pair of batches.
    assert!(pool.stats().cleanup_count >= 2);
}

#[test]
fn empty_submission_returns_empty_list() {
    let (pool, tally) = start_pool(config(), 2, Duration::ZERO);

    let mut calls = 0;
    let outcomes = pool.process_many_with_progress(Vec::new(), |_| calls += 1).unwrap();
    assert!(outcomes.is_empty());
    assert_eq!(calls, 0);
    assert_eq!(tally.peak(), 0);
    assert_eq!(pool.stats().counters.total_processed, 0);

    assert!(pool.process_batched(Vec::new(), |_| {}).unwrap().is_empty());
}

#[test]
fn hung_task_times_out_and_worker_is_replaced() {
    let (pool, tally) = start_pool(config().with_task_timeout_ms(200), 1, Duration::ZERO);

    let started = Instant::now();
    let outcomes = pool
        .process_many(vec![page(0, HANG), page(1, 7)])
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].error_kind(), Some(ErrorKind::Timeout));
    assert!(outcomes[1].success());
    assert_eq!(texts(&outcomes)[1].as_deref(), Some("page-7"));
    assert_eq!(tally.sessions(), 2);

    let stats = pool.stats();
    assert_eq!(stats.counters.timeouts, 1);
    assert_eq!(stats.available_workers, 1);
    assert_eq!(stats.busy_workers, 0);

    // The replacement worker keeps serving later calls.
    let outcomes = pool.process_many(pages(3)).unwrap();
    assert!(outcomes.iter().all(TaskOutcome::success));
}

#[test]
fn failures_stay_local_to_their_file() {
    let (pool, _tally) = start_pool(config(), 2, Duration::ZERO);

    let outcomes = pool
        .process_many(vec![page(0, 1), corrupt(1), page(2, FAIL), page(3, 3)])
        .unwrap();

    let kinds: Vec<Option<ErrorKind>> = outcomes.iter().map(TaskOutcome::error_kind).collect();
    assert_eq!(
        kinds,
        vec![None, Some(ErrorKind::Decode), Some(ErrorKind::Inference), None]
    );
    assert_eq!(outcomes[1].file_name, "page_1.png");
    assert!(outcomes[1].result.is_none());

    let stats = pool.stats();
    assert_eq!(stats.counters.total_processed, 4);
    assert_eq!(stats.counters.total_errors, 2);
    assert_eq!(stats.success_rate, 50.0);
}

#[test]
fn oversized_submission_is_rejected_whole() {
    let config = config().with_max_queue_size(3).with_batch_size(2);
    let (pool, tally) = start_pool(config, 1, Duration::ZERO);

    match pool.process_many(pages(4)) {
        Err(PoolError::QueueOverflow {
            requested,
            capacity,
        }) => assert_eq!((requested, capacity), (4, 3)),
        other => panic!("expected queue overflow, got {other:?}"),
    }
    assert_eq!(tally.peak(), 0);
    assert_eq!(pool.stats().counters.total_processed, 0);

    // The batched entry point chunks the same input.
    let outcomes = pool.process_batched(pages(4), |_| {}).unwrap();
    assert_eq!(outcomes.len(), 4);
}

#[test]
fn queue_absorbs_more_files_than_workers() {
    let (pool, tally) = start_pool(config(), 2, Duration::from_millis(10));

    let outcomes = pool.process_many(pages(20)).unwrap();
    assert_eq!(outcomes.len(), 20);
    assert!(outcomes.iter().all(TaskOutcome::success));
    assert!(tally.peak() <= 2);
}

#[test]
fn initialize_is_idempotent() {
    let (pool, tally) = start_pool(config(), 3, Duration::ZERO);
    pool.initialize(Some(5)).unwrap();
    assert_eq!(tally.sessions(), 3);
    assert_eq!(pool.stats().total_workers, 3);
}

#[test]
fn failed_session_leaves_pool_uninitialized() {
    let factory = |worker: usize| -> Result<Box<dyn InferenceSession>, InferenceError> {
        if worker == 1 {
            return Err(InferenceError::new("model file missing"));
        }
        Ok(Box::new(common::NullSession))
    };
    let pool = WorkerPool::builder(factory)
        .without_memory_sampler()
        .build()
        .unwrap();

    match pool.initialize(Some(3)) {
        Err(PoolError::Initialization { worker_id, source }) => {
            assert_eq!(worker_id, 1);
            assert_eq!(source.message, "model file missing");
        }
        other => panic!("expected initialization error, got {other:?}"),
    }
    assert!(!pool.is_initialized());
    assert_eq!(pool.stats().total_workers, 0);
    assert!(matches!(
        pool.process_many(pages(1)),
        Err(PoolError::NotInitialized)
    ));
}

#[test]
fn processing_requires_initialization() {
    let tally = Arc::new(common::Tally::default());
    let pool = WorkerPool::builder(common::factory(tally, Duration::ZERO))
        .without_memory_sampler()
        .build()
        .unwrap();

    assert!(matches!(
        pool.process_many(pages(2)),
        Err(PoolError::NotInitialized)
    ));
    assert!(matches!(
        pool.process_batched(Vec::new(), |_| {}),
        Err(PoolError::NotInitialized)
    ));
}

#[test]
fn shutdown_resets_worker_counts_and_blocks_processing() {
    let (pool, _tally) = start_pool(config(), 2, Duration::ZERO);
    pool.process_many(pages(2)).unwrap();

    pool.shutdown();
    let stats = pool.stats();
    assert!(!stats.is_initialized);
    assert_eq!(stats.total_workers, 0);
    assert_eq!(stats.available_workers, 0);
    assert_eq!(stats.counters.total_processed, 2);
    assert!(matches!(
        pool.process_many(pages(1)),
        Err(PoolError::NotInitialized)
    ));

    // Shutting down twice is harmless, and the pool can be started again.
    pool.shutdown();
    pool.initialize(Some(1)).unwrap();
    assert!(pool.process_many(pages(1)).unwrap()[0].success());
}

#[test]
fn shutdown_cancels_queued_tasks() {
    let config = config().with_shutdown_timeout_ms(2_000);
    let (pool, _tally) = start_pool(config, 1, Duration::from_millis(300));
    let pool = Arc::new(pool);

    let stopper = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            pool.shutdown();
        })
    };

    let outcomes = pool.process_many(pages(3)).unwrap();
    stopper.join().unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].success());
    assert_eq!(outcomes[1].error_kind(), Some(ErrorKind::Cancellation));
    assert_eq!(outcomes[2].error_kind(), Some(ErrorKind::Cancellation));
    assert_eq!(pool.stats().total_workers, 0);
}

#[test]
fn hard_memory_limit_refuses_admission() {
    let tally = Arc::new(common::Tally::default());
    let config = config()
        .with_max_memory_mb(64)
        .with_throttle_delay_ms(0)
        .with_admission(AdmissionPolicy::HardLimit);
    let pool = WorkerPool::builder(common::factory(Arc::clone(&tally), Duration::ZERO))
        .config(config)
        .memory_sampler(|| Some(4096_u64 * 1024 * 1024))
        .build()
        .unwrap();
    pool.initialize(Some(2)).unwrap();

    let outcomes = pool.process_many(pages(3)).unwrap();
    assert!(
        outcomes
            .iter()
            .all(|o| o.error_kind() == Some(ErrorKind::MemoryPressure))
    );
    assert_eq!(tally.peak(), 0);
    assert_eq!(pool.stats().memory_usage_mb, Some(4096.0));
}

#[test]
fn soft_memory_limit_throttles_but_admits() {
    let tally = Arc::new(common::Tally::default());
    let config = config().with_max_memory_mb(64).with_throttle_delay_ms(1);
    let pool = WorkerPool::builder(common::factory(Arc::clone(&tally), Duration::ZERO))
        .config(config)
        .memory_sampler(|| Some(128_u64 * 1024 * 1024))
        .build()
        .unwrap();
    pool.initialize(Some(2)).unwrap();

    let outcomes = pool.process_many(pages(3)).unwrap();
    assert!(outcomes.iter().all(TaskOutcome::success));
    assert_eq!(pool.governor().throttle_count(), 3);
    assert!(pool.stats().cleanup_count >= 3);
}

#[test]
fn cleanup_reaches_every_session() {
    let (pool, tally) = start_pool(config(), 3, Duration::ZERO);
    pool.force_cleanup();

    let deadline = Instant::now() + Duration::from_secs(5);
    while tally.cleanups() < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(tally.cleanups(), 3);
    let stats = pool.stats();
    assert_eq!(stats.cleanup_count, 1);
    assert!(stats.last_cleanup.is_some());
}

#[test]
fn periodic_cleanup_runs_in_background() {
    let (pool, tally) = start_pool(config().with_gc_interval_ms(20), 1, Duration::ZERO);

    let deadline = Instant::now() + Duration::from_secs(5);
    while tally.cleanups() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(tally.cleanups() >= 2);
    pool.shutdown();
}

#[test]
fn decodes_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.png");
    std::fs::write(&path, common::png(42)).unwrap();

    let (pool, _tally) = start_pool(config(), 1, Duration::ZERO);
    let outcomes = pool
        .process_many(vec![
            InputFile::from_path(&path),
            InputFile::from_path(dir.path().join("missing.png")),
        ])
        .unwrap();

    assert_eq!(outcomes[0].file_name, "scan.png");
    assert_eq!(texts(&outcomes)[0].as_deref(), Some("page-42"));
    assert_eq!(outcomes[1].error_kind(), Some(ErrorKind::Decode));
}

#[test]
fn dropping_the_pool_shuts_it_down() {
    let (pool, tally) = start_pool(config(), 2, Duration::ZERO);
    pool.process_many(pages(2)).unwrap();
    drop(pool);
    assert_eq!(tally.sessions(), 2);
}

#[test]
fn panicking_cache_release_leaves_workers_usable() {
    let tally = Arc::new(common::Tally::default());
    let opened = Arc::clone(&tally);
    let factory = move |_worker: usize| -> Result<Box<dyn InferenceSession>, InferenceError> {
        opened.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(common::BrittleCacheSession))
    };
    let pool = WorkerPool::builder(factory)
        .config(config().with_task_timeout_ms(10_000))
        .without_memory_sampler()
        .build()
        .unwrap();
    pool.initialize(Some(2)).unwrap();

    pool.force_cleanup();
    let started = Instant::now();
    let outcomes = pool.process_many(pages(4)).unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        texts(&outcomes),
        (0..4).map(|i| Some(format!("page-{i}"))).collect::<Vec<_>>()
    );
    // No worker died, so none had to be replaced.
    assert_eq!(tally.sessions(), 2);
    assert_eq!(pool.stats().total_workers, 2);
}

#[test]
fn shutdown_abandons_unresponsive_workers() {
    let config = config().with_shutdown_timeout_ms(200);
    let (pool, _tally) = start_pool(config, 1, Duration::ZERO);
    let pool = Arc::new(pool);

    let stopper = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let started = Instant::now();
            pool.shutdown();
            started.elapsed()
        })
    };

    let outcomes = pool.process_many(vec![page(0, HANG), page(1, 1)]).unwrap();
    let shutdown_took = stopper.join().unwrap();

    assert!(shutdown_took >= Duration::from_millis(200));
    assert!(shutdown_took < Duration::from_secs(2));
    let kinds: Vec<_> = outcomes.iter().map(TaskOutcome::error_kind).collect();
    assert_eq!(
        kinds,
        vec![Some(ErrorKind::Cancellation), Some(ErrorKind::Cancellation)]
    );
    assert_eq!(pool.stats().total_workers, 0);
}

#[test]
fn concurrent_batched_calls_do_not_interleave() {
    let (pool, _tally) = start_pool(config().with_batch_size(2), 2, Duration::from_millis(20));
    let pool = Arc::new(pool);
    let log = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(Barrier::new(2));

    let callers: Vec<_> = (0..2)
        .map(|caller| {
            let pool = Arc::clone(&pool);
            let log = Arc::clone(&log);
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.wait();
                let mut batches = Vec::new();
                let outcomes = pool
                    .process_batched(pages(5), |e| {
                        batches.push(e.batch_index);
                        log.lock().unwrap().push(caller);
                    })
                    .unwrap();
                (outcomes, batches)
            })
        })
        .collect();

    for caller in callers {
        let (outcomes, batches) = caller.join().unwrap();
        assert!(outcomes.iter().all(TaskOutcome::success));
        assert_eq!(batches, vec![0, 0, 1, 1, 2]);
    }

    // Each call ran start to finish before the other one began.
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 10);
    assert!(log[..5].iter().all(|&c| c == log[0]));
    assert!(log[5..].iter().all(|&c| c != log[0]));
}

#[test]
fn stats_stay_responsive_while_sessions_open() {
    let tally = Arc::new(common::Tally::default());
    let opened = Arc::clone(&tally);
    let factory = move |_worker: usize| -> Result<Box<dyn InferenceSession>, InferenceError> {
        thread::sleep(Duration::from_millis(400));
        opened.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(common::NullSession))
    };
    let pool = Arc::new(
        WorkerPool::builder(factory)
            .without_memory_sampler()
            .build()
            .unwrap(),
    );

    let initializers: Vec<_> = (0..2)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.initialize(Some(2)))
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    let stats = pool.stats();
    let initialized = pool.is_initialized();
    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(!stats.is_initialized);
    assert!(!initialized);

    for initializer in initializers {
        initializer.join().unwrap().unwrap();
    }
    // The second caller found the pool ready and opened nothing.
    assert_eq!(tally.sessions(), 2);
    assert_eq!(pool.stats().total_workers, 2);
}
