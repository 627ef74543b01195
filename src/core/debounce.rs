use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Trailing-edge debouncer: a key fires once its quiet period has elapsed
/// since the last push, carrying the most recent value.
#[derive(Debug)]
pub struct Debouncer<K, V> {
    delays: HashMap<K, Duration>,
    default_delay: Duration,
    pending: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash + Clone, V> Debouncer<K, V> {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            delays: HashMap::new(),
            default_delay,
            pending: HashMap::new(),
        }
    }

    pub fn with_delay(mut self, key: K, delay: Duration) -> Self {
        self.delays.insert(key, delay);
        self
    }

    pub fn delay(&self, key: &K) -> Duration {
        self.delays.get(key).copied().unwrap_or(self.default_delay)
    }

    pub fn push(&mut self, key: K, value: V, now: Instant) {
        let deadline = now + self.delay(&key);
        self.pending.insert(key, (deadline, value));
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(deadline, _)| *deadline).min()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes and returns every entry whose deadline is at or before `now`,
    /// earliest first.
    pub fn drain_due(&mut self, now: Instant) -> Vec<(K, V)> {
        let due_keys: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut due: Vec<(Instant, K, V)> = due_keys
            .into_iter()
            .filter_map(|key| {
                self.pending
                    .remove(&key)
                    .map(|(deadline, value)| (deadline, key, value))
            })
            .collect();
        due.sort_by_key(|(deadline, _, _)| *deadline);
        due.into_iter().map(|(_, key, value)| (key, value)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Activate,
        Launch,
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn burst_collapses_to_last_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(300));

        debouncer.push(Kind::Activate, "com.apple.Safari", start);
        debouncer.push(Kind::Activate, "com.apple.Terminal", start + ms(100));
        debouncer.push(Kind::Activate, "com.apple.Notes", start + ms(200));

        assert!(debouncer.drain_due(start + ms(300)).is_empty());
        assert_eq!(debouncer.next_deadline(), Some(start + ms(500)));
        assert_eq!(
            debouncer.drain_due(start + ms(500)),
            vec![(Kind::Activate, "com.apple.Notes")]
        );
        assert!(debouncer.is_empty());
    }

    #[test]
    fn keys_use_their_own_delays_and_fire_in_deadline_order() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(300)).with_delay(Kind::Launch, ms(500));
        assert_eq!(debouncer.delay(&Kind::Launch), ms(500));
        assert_eq!(debouncer.delay(&Kind::Activate), ms(300));

        debouncer.push(Kind::Launch, 1, start);
        debouncer.push(Kind::Activate, 2, start + ms(50));

        assert_eq!(debouncer.drain_due(start + ms(400)), vec![(Kind::Activate, 2)]);
        assert_eq!(debouncer.next_deadline(), Some(start + ms(500)));
        assert_eq!(debouncer.drain_due(start + ms(600)), vec![(Kind::Launch, 1)]);
    }

    #[test]
    fn multiple_due_entries_are_sorted() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(10)).with_delay(Kind::Launch, ms(5));
        debouncer.push(Kind::Activate, 'a', start);
        debouncer.push(Kind::Launch, 'l', start);
        assert_eq!(
            debouncer.drain_due(start + ms(20)),
            vec![(Kind::Launch, 'l'), (Kind::Activate, 'a')]
        );
        assert_eq!(debouncer.next_deadline(), None);
    }
}
