// Allocator Tests
// Concurrent allocation, leak reporting and name validation

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use blockcache_engine::{
    ALLOCATOR_NAME_MAX, Allocator, CacheError, Diagnostic, DiagnosticSink, ErrorKind, PoolItem,
};
use parking_lot::Mutex;

#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    fn leaks(&self) -> usize {
        self.seen
            .lock()
            .iter()
            .filter(|d| matches!(d, Diagnostic::Leak(_)))
            .count()
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        self.seen.lock().push(diagnostic);
    }
}

#[test]
fn test_concurrent_items_are_distinct() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;
    const SIZE: usize = 40;

    let sink = Arc::new(RecordingSink::default());
    let allocator = Arc::new(Allocator::with_sink(SIZE, "concurrent", sink.clone()).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let allocator = Arc::clone(&allocator);
            thread::spawn(move || {
                let mut items: Vec<PoolItem> = Vec::with_capacity(PER_THREAD);
                for i in 0..PER_THREAD {
                    let mut item = allocator.new_item().unwrap();
                    assert_eq!(item.len(), SIZE);
                    assert!(item.as_slice().iter().all(|&b| b == 0));
                    item.as_mut_slice().fill((t * PER_THREAD + i) as u8);
                    items.push(item);
                }
                items
            })
        })
        .collect();

    let items: Vec<PoolItem> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(allocator.live_count(), THREADS * PER_THREAD);

    // Regions do not overlap: every payload starts at a unique address and
    // still holds exactly what its owner wrote.
    let starts: HashSet<usize> = items.iter().map(|i| i.as_slice().as_ptr() as usize).collect();
    assert_eq!(starts.len(), items.len());
    for item in &items {
        let first = item.as_slice()[0];
        assert!(item.as_slice().iter().all(|&b| b == first));
    }

    let mut batches: Vec<Vec<PoolItem>> = (0..THREADS).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        batches[i % THREADS].push(item);
    }

    let deleters: Vec<_> = batches
        .into_iter()
        .map(|batch| {
            let allocator = Arc::clone(&allocator);
            thread::spawn(move || {
                for item in batch {
                    allocator.delete(item);
                }
            })
        })
        .collect();

    for deleter in deleters {
        deleter.join().unwrap();
    }

    let allocator = Arc::try_unwrap(allocator).unwrap();
    assert_eq!(allocator.live_count(), 0);
    assert!(allocator.destroy().is_none());
    assert_eq!(sink.leaks(), 0);
}

#[test]
fn test_destroy_with_outstanding_items() {
    let sink = Arc::new(RecordingSink::default());
    let allocator = Allocator::with_sink(128, "outstanding", sink.clone()).unwrap();

    let abandoned: Vec<PoolItem> = (0..3).map(|_| allocator.new_item().unwrap()).collect();
    let warning = allocator.destroy().unwrap();

    assert_eq!(warning.outstanding, 3);
    assert!(warning.to_string().contains("3 object(s) not deallocated"));
    assert_eq!(sink.leaks(), 1);

    // Items outlive their allocator safely.
    for item in &abandoned {
        assert_eq!(item.len(), 128);
    }
    drop(abandoned);
    assert_eq!(sink.leaks(), 1);
}

#[test]
fn test_name_too_long_is_allocation_error() {
    let sink = Arc::new(RecordingSink::default());
    let name = format!("pool_{}", "n".repeat(ALLOCATOR_NAME_MAX));

    let err = Allocator::with_sink(8, &name, sink.clone()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Allocation);
    assert!(matches!(err, CacheError::AllocatorNameTooLong { .. }));
    // Nothing was built, so nothing is reported on teardown.
    assert!(sink.seen.lock().is_empty());
}

#[test]
fn test_formatted_names() {
    let allocator = Allocator::create(8, format_args!("req_{}", 16)).unwrap();
    assert_eq!(allocator.name(), "req_16");
    allocator.destroy();
}
