//! Background thread that releases actions of unreachable owners

use crate::cleanable::RegistrationId;
use crate::registry::RegistryShared;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Messages consumed by the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchEvent {
    /// The owner of this registration was just dropped
    Unreachable(RegistrationId),
    /// Scan the whole table for dropped owners
    Sweep,
}

/// Spawn the watcher.
///
/// The thread owns a strong handle to the registry state, so pending actions
/// outlive the last `CleanupRegistry` handle. It retires once no handle is
/// left and the table is empty.
pub(crate) fn spawn(
    name: &str,
    registry: Arc<RegistryShared>,
    events: Receiver<WatchEvent>,
    sweep_interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run(registry, events, sweep_interval))
}

fn run(registry: Arc<RegistryShared>, events: Receiver<WatchEvent>, sweep_interval: Duration) {
    tracing::debug!(sweep_interval = ?sweep_interval, "cleanup watcher started");

    loop {
        let event = match events.recv_timeout(sweep_interval) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => WatchEvent::Sweep,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match event {
            WatchEvent::Unreachable(id) => {
                if !registry.reclaim(id) {
                    tracing::trace!(id = %id, "notice ignored: owner alive or already released");
                }
            }
            WatchEvent::Sweep => {
                let reclaimed = registry.sweep();
                if reclaimed > 0 {
                    tracing::debug!(reclaimed, "sweep released unreachable owners");
                }
            }
        }

        if registry.is_retired() {
            break;
        }
    }

    registry.watcher_stopped();
    tracing::debug!("cleanup watcher stopped");
}
