//! Token dedup cache
//!
//! Remembers which acknowledgement/execution tokens were already handled so a
//! redelivered frame is not processed twice. Entries expire after a TTL
//! whether or not they were ever seen again.

use hub_bridge_shared::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A handled token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    pub command: String,
    pub stored_at_ms: u64,
}

/// TTL-bounded set of handled tokens
pub struct DedupCache {
    entries: HashMap<String, DedupEntry>,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl DedupCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms: ttl.as_millis() as u64,
            clock,
        }
    }

    pub fn is_duplicate(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    /// Record a handled token, refreshing its timestamp if already present
    pub fn store(&mut self, token: impl Into<String>, command: impl Into<String>) {
        let entry = DedupEntry {
            command: command.into(),
            stored_at_ms: self.clock.now_ms(),
        };
        self.entries.insert(token.into(), entry);
    }

    pub fn get(&self, token: &str) -> Option<&DedupEntry> {
        self.entries.get(token)
    }

    /// Drop entries whose age reached the TTL
    pub fn gc_ttl(&mut self) -> usize {
        let now = self.clock.now_ms();
        let ttl = self.ttl_ms;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.stored_at_ms) < ttl);
        before - self.entries.len()
    }
}

#[cfg(test)]
impl DedupCache {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_bridge_shared::ManualClock;

    #[test]
    fn test_duplicate_detection() {
        let clock = Arc::new(ManualClock::new(100));
        let mut cache = DedupCache::new(clock, Duration::from_secs(600));

        assert!(!cache.is_duplicate("abc"));
        cache.store("abc", "start_cycle");
        assert!(cache.is_duplicate("abc"));
        assert_eq!(
            cache.get("abc"),
            Some(&DedupEntry {
                command: "start_cycle".into(),
                stored_at_ms: 100
            })
        );
    }

    #[test]
    fn test_gc_ttl_boundary() {
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = DedupCache::new(clock.clone(), Duration::from_secs(10));
        cache.store("old", "start_cycle");
        clock.advance_ms(5_000);
        cache.store("new", "stop_cycle");

        clock.advance_ms(4_999);
        assert_eq!(cache.gc_ttl(), 0);

        clock.advance_ms(1);
        assert_eq!(cache.gc_ttl(), 1);
        assert!(!cache.is_duplicate("old"));
        assert!(cache.is_duplicate("new"));
        assert_eq!(cache.len(), 1);
    }
}
