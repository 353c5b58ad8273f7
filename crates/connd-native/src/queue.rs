use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::{CONNECTOR_TARGET, DaemonEvent};

#[derive(Debug)]
struct Pending {
    cmd_number: u32,
    responses: VecDeque<DaemonEvent>,
    request: Option<String>,
}

/// Entry reported by [`ResponseQueue::dump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    /// Sequence number awaiting responses.
    pub cmd_number: u32,
    /// The command line, when a caller is already waiting.
    pub request: Option<String>,
}

/// Correlates daemon responses with waiting callers by sequence number.
///
/// At most `capacity` commands are tracked. Tracking another evicts the
/// oldest, whose waiter then times out.
#[derive(Debug)]
pub struct ResponseQueue {
    capacity: usize,
    pending: Mutex<VecDeque<Pending>>,
    arrived: Condvar,
}

impl ResponseQueue {
    /// Creates a queue bounded to `capacity` commands (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pending: Mutex::new(VecDeque::new()),
            arrived: Condvar::new(),
        }
    }

    /// Stores a response for `cmd_number` and wakes waiters.
    pub fn add(&self, cmd_number: u32, response: DaemonEvent) {
        let mut pending = self.lock();
        match pending.iter_mut().find(|entry| entry.cmd_number == cmd_number) {
            Some(entry) => entry.responses.push_back(response),
            None => {
                self.make_room(&mut pending);
                pending.push_back(Pending {
                    cmd_number,
                    responses: VecDeque::from([response]),
                    request: None,
                });
            }
        }
        drop(pending);
        self.arrived.notify_all();
    }

    /// Waits up to `timeout` for the next response to `cmd_number`.
    ///
    /// Returns `None` on timeout.
    pub fn remove(&self, cmd_number: u32, timeout: Duration, request: &str) -> Option<DaemonEvent> {
        let deadline = Instant::now() + timeout;
        let mut pending = self.lock();
        loop {
            if let Some(position) = pending
                .iter()
                .position(|entry| entry.cmd_number == cmd_number)
            {
                if let Some(entry) = pending.get_mut(position) {
                    entry.request = Some(request.to_owned());
                    if let Some(response) = entry.responses.pop_front() {
                        if entry.responses.is_empty() {
                            pending.remove(position);
                        }
                        return Some(response);
                    }
                }
            } else {
                self.make_room(&mut pending);
                pending.push_back(Pending {
                    cmd_number,
                    responses: VecDeque::new(),
                    request: Some(request.to_owned()),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                pending.retain(|entry| entry.cmd_number != cmd_number || !entry.responses.is_empty());
                warn!(
                    target: CONNECTOR_TARGET,
                    cmd = cmd_number,
                    request,
                    "timeout waiting for response"
                );
                return None;
            }
            pending = self
                .arrived
                .wait_timeout(pending, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Commands currently tracked, oldest first.
    #[must_use]
    pub fn dump(&self) -> Vec<PendingCommand> {
        self.lock()
            .iter()
            .map(|entry| PendingCommand {
                cmd_number: entry.cmd_number,
                request: entry.request.clone(),
            })
            .collect()
    }

    fn make_room(&self, pending: &mut VecDeque<Pending>) {
        while pending.len() >= self.capacity {
            let Some(evicted) = pending.pop_front() else {
                break;
            };
            warn!(
                target: CONNECTOR_TARGET,
                cmd = evicted.cmd_number,
                request = evicted.request.as_deref().unwrap_or(""),
                capacity = self.capacity,
                "more responses buffered than allowed; evicting oldest"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
