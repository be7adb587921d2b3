use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use bytes::Bytes;

/// One cached rendered response.
#[derive(Debug, Clone)]
struct CacheEntry {
    body: Bytes,
    content_type: String,
    inserted: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted.elapsed() > self.ttl
    }
}

/// URL-keyed, TTL-bounded response cache.
///
/// Expiry is lazy: an expired entry is removed when a lookup encounters it,
/// or when an insert at capacity needs room. At most one entry exists per
/// URL; inserts overwrite and refresh the insertion time.
///
/// The store itself is a plain data structure; the router wraps it in a lock
/// because HTTP handlers run concurrently.
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl CacheStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Returns the cached body and content type for `url`, if an unexpired
    /// entry exists. An expired entry encountered here is removed.
    pub fn get(&mut self, url: &str) -> Option<(Bytes, String)> {
        match self.entries.get(url) {
            Some(entry) if entry.is_expired() => {}
            Some(entry) => return Some((entry.body.clone(), entry.content_type.clone())),
            None => return None,
        }
        self.entries.remove(url);
        None
    }

    /// Inserts or overwrites the entry for `url`; insertion time is now.
    ///
    /// At capacity, expired entries are evicted first, then the oldest entry
    /// by insertion time.
    pub fn put(&mut self, url: impl Into<String>, body: Bytes, content_type: impl Into<String>) {
        let url = url.into();
        if !self.entries.contains_key(&url) && self.entries.len() >= self.max_entries {
            self.evict_one();
        }
        self.entries.insert(
            url,
            CacheEntry {
                body,
                content_type: content_type.into(),
                inserted: Instant::now(),
                ttl: self.ttl,
            },
        );
    }

    /// Whether an unexpired entry exists for `url`. Does not evict.
    pub fn has(&self, url: &str) -> bool {
        self.entries.get(url).is_some_and(|e| !e.is_expired())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_one(&mut self) {
        if let Some(key) = self
            .entries
            .iter()
            .find(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
        {
            self.entries.remove(&key);
            return;
        }
        if let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.inserted)
            .map(|(k, _)| k.clone())
        {
            self.entries.remove(&key);
        }
    }
}

/// The set of URLs eligible for caching.
///
/// Populated once before the listener starts and read-only afterwards, so no
/// lock is needed.
#[derive(Debug, Default)]
pub struct CacheableSet {
    urls: HashSet<String>,
}

impl CacheableSet {
    /// Builds the set from a slice of URL strings.
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl_ms: u64, cap: usize) -> CacheStore {
        CacheStore::new(Duration::from_millis(ttl_ms), cap)
    }

    #[test]
    fn test_get_returns_inserted_body() {
        let mut cache = store(60_000, 16);
        cache.put("/p", Bytes::from_static(b"<html/>"), "text/html");

        let (body, content_type) = cache.get("/p").unwrap();
        assert_eq!(&body[..], b"<html/>");
        assert_eq!(content_type, "text/html");
    }

    #[test]
    fn test_miss_returns_none() {
        let mut cache = store(60_000, 16);
        assert!(cache.get("/missing").is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let mut cache = store(60_000, 16);
        cache.put("/p", Bytes::from_static(b"old"), "text/html");
        cache.put("/p", Bytes::from_static(b"new"), "text/html");

        assert_eq!(cache.len(), 1);
        assert_eq!(&cache.get("/p").unwrap().0[..], b"new");
    }

    #[test]
    fn test_expired_entry_is_absent_and_evicted() {
        let mut cache = store(30, 16);
        cache.put("/p", Bytes::from_static(b"x"), "text/html");
        assert!(cache.has("/p"));

        std::thread::sleep(Duration::from_millis(60));

        assert!(!cache.has("/p"));
        assert!(cache.get("/p").is_none());
        // the lookup removed the stale entry
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let mut cache = store(60_000, 2);
        cache.put("/a", Bytes::from_static(b"a"), "text/html");
        std::thread::sleep(Duration::from_millis(5));
        cache.put("/b", Bytes::from_static(b"b"), "text/html");
        cache.put("/c", Bytes::from_static(b"c"), "text/html");

        assert_eq!(cache.len(), 2);
        assert!(!cache.has("/a"));
        assert!(cache.has("/b"));
        assert!(cache.has("/c"));
    }

    #[test]
    fn test_cap_prefers_evicting_expired() {
        let mut cache = CacheStore::new(Duration::from_millis(30), 2);
        cache.put("/stale", Bytes::from_static(b"s"), "text/html");
        std::thread::sleep(Duration::from_millis(60));

        // /stale is expired; /fresh is not
        cache.put("/fresh", Bytes::from_static(b"f"), "text/html");
        cache.put("/new", Bytes::from_static(b"n"), "text/html");

        assert!(!cache.has("/stale"));
        assert!(cache.has("/fresh"));
        assert!(cache.has("/new"));
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let mut cache = store(60_000, 2);
        cache.put("/a", Bytes::from_static(b"a"), "text/html");
        cache.put("/b", Bytes::from_static(b"b"), "text/html");
        cache.put("/a", Bytes::from_static(b"a2"), "text/html");

        assert_eq!(cache.len(), 2);
        assert!(cache.has("/b"));
    }

    #[test]
    fn test_cacheable_set_membership() {
        let set = CacheableSet::from_urls(["/page1", "/page2", "/itemgrid"]);
        assert!(set.contains("/page1"));
        assert!(set.contains("/itemgrid"));
        assert!(!set.contains("/page3"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_cacheable_set_empty() {
        let set = CacheableSet::default();
        assert!(set.is_empty());
        assert!(!set.contains("/anything"));
    }
}
