use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::config::CACHE_TTL;


const PRUNE_THRESHOLD: usize = 256;


struct Entry<V> {
    data: V,
    created_time: Instant,
}

impl<V> Entry<V> {
    fn is_valid(&self, ttl: Duration) -> bool {
        self.created_time.elapsed() <= ttl
    }
}


/// Keyed data that expires after a fixed time-to-live.
pub struct TtlCache<V> {
    entries: HashMap<String, Entry<V>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        TtlCache::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        TtlCache {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key)
            .filter(|entry| entry.is_valid(self.ttl))
            .map(|entry| entry.data.clone())
    }

    pub fn set(&mut self, key: String, data: V) {
        self.entries.insert(key, Entry {
            data,
            created_time: Instant::now(),
        });

        if self.entries.len() > PRUNE_THRESHOLD {
            let ttl = self.ttl;
            self.entries.retain(|_, entry| entry.is_valid(ttl));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn returns_fresh_data() {
        let mut cache = TtlCache::new();
        cache.set("weather".into(), 42);

        assert_eq!(cache.get("weather"), Some(42));
        assert_eq!(cache.get("alerts"), None);
    }

    #[test]
    fn expired_data_is_hidden() {
        let mut cache = TtlCache::with_ttl(Duration::from_millis(10));
        cache.set("weather".into(), "sunny".to_owned());

        thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.get("weather"), None);
    }

    #[test]
    fn prunes_expired_entries_when_large() {
        let mut cache = TtlCache::with_ttl(Duration::from_millis(5));
        for i in 0..PRUNE_THRESHOLD {
            cache.set(i.to_string(), i);
        }

        thread::sleep(Duration::from_millis(20));
        cache.set("fresh".into(), 0);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some(0));
    }
}
