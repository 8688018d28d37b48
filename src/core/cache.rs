//! core::cache
//!
//! Single-slot cache keyed by an invalidation token.
//!
//! The cache remembers the key that produced its value (a file mtime, a
//! commit id). A lookup with the same key returns the stored value; any other
//! key recomputes. Staleness between key changes is accepted by callers.
//! Callers that share a cache across threads wrap it in one `Mutex` so a
//! rebuild is never interleaved with another lookup.

/// A value memoized against the key it was computed from.
///
/// ```
/// use repoflow::core::cache::KeyedCache;
///
/// let mut cache: KeyedCache<u32, String> = KeyedCache::new();
/// let mut builds = 0;
/// for _ in 0..3 {
///     cache.get_or_rebuild(7, || -> Result<_, ()> { builds += 1; Ok("v".into()) }).unwrap();
/// }
/// assert_eq!(builds, 1);
/// ```
#[derive(Debug, Clone)]
pub struct KeyedCache<K, V> {
    entry: Option<(K, V)>,
    stale: bool,
    rebuilds: u64,
}

impl<K, V> Default for KeyedCache<K, V> {
    fn default() -> Self {
        Self {
            entry: None,
            stale: false,
            rebuilds: 0,
        }
    }
}

impl<K: PartialEq, V> KeyedCache<K, V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value if `key` matches, otherwise rebuild it.
    ///
    /// A failed rebuild leaves the previous entry in place.
    pub fn get_or_rebuild<E, F>(&mut self, key: K, rebuild: F) -> Result<&V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.refresh_with(key, |_| rebuild())
    }

    /// Like [`get_or_rebuild`](Self::get_or_rebuild), but the rebuild sees
    /// the value it replaces so it can carry parts of it over.
    pub fn refresh_with<E, F>(&mut self, key: K, rebuild: F) -> Result<&V, E>
    where
        F: FnOnce(Option<&V>) -> Result<V, E>,
    {
        let fresh = !self.stale && matches!(&self.entry, Some((cached, _)) if *cached == key);
        if !fresh {
            let value = rebuild(self.peek())?;
            self.rebuilds += 1;
            self.stale = false;
            self.entry = Some((key, value));
        }
        match &self.entry {
            Some((_, value)) => Ok(value),
            None => unreachable!("entry populated above"),
        }
    }

    /// The cached value, regardless of key.
    pub fn peek(&self) -> Option<&V> {
        self.entry.as_ref().map(|(_, v)| v)
    }

    /// The key the cached value was computed from.
    pub fn key(&self) -> Option<&K> {
        self.entry.as_ref().map(|(k, _)| k)
    }

    /// Drop the cached value.
    pub fn invalidate(&mut self) {
        self.entry = None;
        self.stale = false;
    }

    /// Force the next lookup to rebuild while keeping the value visible to
    /// [`peek`](Self::peek) and to the rebuild.
    pub fn expire(&mut self) {
        self.stale = true;
    }

    /// How many times the value has been (re)computed.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_reuses_value() {
        let mut cache = KeyedCache::new();
        let v1 = *cache.get_or_rebuild(1, || Ok::<_, ()>(10)).unwrap();
        let v2 = *cache.get_or_rebuild(1, || Ok::<_, ()>(20)).unwrap();
        assert_eq!((v1, v2), (10, 10));
        assert_eq!(cache.rebuild_count(), 1);
    }

    #[test]
    fn new_key_rebuilds() {
        let mut cache = KeyedCache::new();
        cache.get_or_rebuild("a", || Ok::<_, ()>(1)).unwrap();
        let v = *cache.get_or_rebuild("b", || Ok::<_, ()>(2)).unwrap();
        assert_eq!(v, 2);
        assert_eq!(cache.key(), Some(&"b"));
        assert_eq!(cache.rebuild_count(), 2);
    }

    #[test]
    fn failed_rebuild_keeps_previous_entry() {
        let mut cache = KeyedCache::new();
        cache.get_or_rebuild(1, || Ok::<_, &str>(5)).unwrap();
        let err = cache.get_or_rebuild(2, || Err("boom")).unwrap_err();
        assert_eq!(err, "boom");
        assert_eq!(cache.peek(), Some(&5));
        assert_eq!(cache.key(), Some(&1));
    }

    #[test]
    fn invalidate_forces_rebuild() {
        let mut cache = KeyedCache::new();
        cache.get_or_rebuild(1, || Ok::<_, ()>(5)).unwrap();
        cache.invalidate();
        assert!(cache.peek().is_none());
        cache.get_or_rebuild(1, || Ok::<_, ()>(6)).unwrap();
        assert_eq!(cache.peek(), Some(&6));
    }

    #[test]
    fn refresh_sees_previous_value() {
        let mut cache = KeyedCache::new();
        cache.get_or_rebuild(1, || Ok::<_, ()>(vec![1])).unwrap();
        let v = cache
            .refresh_with(2, |prev| {
                let mut next = prev.cloned().unwrap_or_default();
                next.push(2);
                Ok::<_, ()>(next)
            })
            .unwrap();
        assert_eq!(v, &vec![1, 2]);
    }

    #[test]
    fn expire_keeps_value_until_rebuilt() {
        let mut cache = KeyedCache::new();
        cache.get_or_rebuild(1, || Ok::<_, ()>(5)).unwrap();
        cache.expire();
        assert_eq!(cache.peek(), Some(&5));
        let v = *cache.refresh_with(1, |prev| Ok::<_, ()>(prev.copied().unwrap_or(0) + 1)).unwrap();
        assert_eq!(v, 6);
        assert_eq!(cache.get_or_rebuild(1, || Ok::<_, ()>(0)).copied(), Ok(6));
        assert_eq!(cache.rebuild_count(), 2);
    }
}
