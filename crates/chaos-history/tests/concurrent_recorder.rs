//! Concurrent writers against one recorder.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chaos_core::{InvokeError, ProcessId};
use chaos_history::{HistoryChecker, HistoryRecord, Recorder, read_history};
use proptest::prelude::*;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_produce_a_well_formed_history() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("history.log");
    let recorder = Arc::new(Recorder::create(&path).unwrap());
    let counter = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for worker in 0..8 {
        let recorder = Arc::clone(&recorder);
        let counter = Arc::clone(&counter);
        handles.push(tokio::spawn(async move {
            let node = format!("n{worker}");
            for _ in 0..50 {
                let id = ProcessId::new(counter.fetch_add(1, Ordering::SeqCst) + 1);
                recorder.record_request(id, &node, &id.as_u64()).unwrap();
                tokio::task::yield_now().await;
                let outcome = if id.as_u64() % 7 == 0 {
                    Err(InvokeError::Indeterminate("reset".into()))
                } else {
                    Ok(id.as_u64())
                };
                recorder.record_response(id, &outcome).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    recorder.close().unwrap();

    let records = read_history(&path).unwrap();
    assert_eq!(records.len(), 800);

    let report = HistoryChecker::check(&records);
    assert!(report.is_valid(), "{:?}", report.violations);
    assert_eq!(report.invokes, 400);
    assert_eq!(report.returns, 400);
    assert_eq!(report.errors, 400 / 7);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// However invocations interleave, pairing them in file order keeps the
    /// history valid.
    #[test]
    fn interleavings_stay_valid(order in Just((1..=12u64).collect::<Vec<_>>()).prop_shuffle()) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.log");
        let recorder = Recorder::create(&path).unwrap();

        for id in 1..=12u64 {
            recorder.record_request(ProcessId::new(id), "n1", &id).unwrap();
        }
        for id in &order {
            recorder.record_response::<u64>(ProcessId::new(*id), &Ok(*id)).unwrap();
        }
        recorder.close().unwrap();

        let records = read_history(&path).unwrap();
        prop_assert_eq!(records.len(), 24);
        prop_assert!(records[..12].iter().all(HistoryRecord::is_invoke));
        prop_assert!(HistoryChecker::check(&records).is_valid());
    }
}
