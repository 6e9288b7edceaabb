//! Pending actions outlive the last registry handle
use cleaners_config::RegistryConfig;
use cleaners_registry::{CleanupRegistry, FnAction, RegistrationId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn registry(sweep_interval_ms: u64) -> CleanupRegistry {
    CleanupRegistry::with_config(&RegistryConfig {
        sweep_interval_ms,
        ..RegistryConfig::default()
    })
}

fn counting(runs: &Arc<AtomicUsize>) -> Arc<FnAction<impl Fn() + Send + Sync + 'static>> {
    let runs = Arc::clone(runs);
    Arc::new(FnAction::new("lease", move || {
        runs.fetch_add(1, Ordering::SeqCst);
    }))
}

fn wait_for_runs(runs: &AtomicUsize, expected: usize) -> usize {
    let deadline = Instant::now() + Duration::from_secs(5);
    while runs.load(Ordering::SeqCst) < expected && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    runs.load(Ordering::SeqCst)
}

/// Owner that keeps its own registry handle and reports its drop
struct Lease {
    registry: CleanupRegistry,
    id: Mutex<Option<RegistrationId>>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(id) = *self.id.lock() {
            self.registry.notify_unreachable(id);
        }
    }
}

#[test]
fn owner_holding_last_handle_is_still_released() {
    let registry = registry(10);
    let runs = Arc::new(AtomicUsize::new(0));
    let lease = Arc::new(Lease {
        registry: registry.clone(),
        id: Mutex::new(None),
    });
    let cleanable = registry.register(&lease, counting(&runs));
    *lease.id.lock() = Some(cleanable.id());

    // The lease now carries the only handle and takes it down with it
    drop(registry);
    drop(lease);

    assert_eq!(wait_for_runs(&runs, 1), 1);
    assert!(cleanable.is_released());
}

#[test]
fn owner_dropped_after_last_handle_is_released_by_sweep() {
    let registry = registry(10);
    let runs = Arc::new(AtomicUsize::new(0));
    let owner = Arc::new(String::from("socket"));
    let cleanable = registry.register(&owner, counting(&runs));

    drop(registry);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    drop(owner);

    assert_eq!(wait_for_runs(&runs, 1), 1);
    assert!(cleanable.is_released());
}
