use std::collections::BTreeMap;
use std::time::Instant;

/// Ordered set of delayed messages keyed for cancellation.
///
/// Several entries may share a key. [`TimerQueue::cancel`] drops all of
/// them, and cancelling a key with no pending entry does nothing, so a
/// timer that already fired cannot be cancelled twice.
#[derive(Debug)]
pub struct TimerQueue<K, M> {
    entries: BTreeMap<(Instant, u64), (K, M)>,
    next_seq: u64,
}

impl<K, M> Default for TimerQueue<K, M> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: PartialEq, M> TimerQueue<K, M> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `message` to fire at `deadline` under `key`.
    pub fn schedule(&mut self, key: K, deadline: Instant, message: M) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.entries.insert((deadline, seq), (key, message));
    }

    /// Removes every pending entry for `key`, returning how many were
    /// dropped.
    pub fn cancel(&mut self, key: &K) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (entry_key, _)| entry_key != key);
        before.saturating_sub(self.entries.len())
    }

    /// Whether any entry for `key` is pending.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.values().any(|(entry_key, _)| entry_key == key)
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Removes and returns every entry due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<M> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let (_, message) = entry.remove();
            due.push(message);
        }
        due
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
