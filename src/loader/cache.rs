use crate::models::DeviceKey;
use std::collections::HashMap;
use std::sync::Arc;

/// Last loaded record list per device.
///
/// Entries are never evicted by size or age; they go away only through
/// [`clear`](Self::clear) or [`clear_all`](Self::clear_all). Lists are stored
/// behind `Arc` so the visible state can share them without copying.
#[derive(Debug)]
pub struct ResultCache<T> {
    entries: HashMap<DeviceKey, Arc<Vec<T>>>,
}

impl<T> ResultCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, device: &DeviceKey) -> Option<Arc<Vec<T>>> {
        self.entries.get(device).cloned()
    }

    /// Store `results` for `device`, returning the entry it replaced.
    pub fn put(&mut self, device: DeviceKey, results: Arc<Vec<T>>) -> Option<Arc<Vec<T>>> {
        self.entries.insert(device, results)
    }

    /// Remove one entry. Returns whether an entry existed.
    pub fn clear(&mut self, device: &DeviceKey) -> bool {
        self.entries.remove(device).is_some()
    }

    /// Remove every entry, returning how many there were.
    pub fn clear_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn contains(&self, device: &DeviceKey) -> bool {
        self.entries.contains_key(device)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DeviceKey> {
        self.entries.keys()
    }
}

impl<T> Default for ResultCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut cache = ResultCache::new();
        let key = DeviceKey::new("a");

        assert!(cache.get(&key).is_none());
        assert!(cache.put(key.clone(), Arc::new(vec![1, 2, 3])).is_none());

        assert_eq!(cache.get(&key).map(|r| r.len()), Some(3));
        assert!(cache.contains(&key));
    }

    #[test]
    fn test_put_replaces() {
        let mut cache = ResultCache::new();
        let key = DeviceKey::new("a");
        cache.put(key.clone(), Arc::new(vec![1]));

        let previous = cache.put(key.clone(), Arc::new(vec![]));

        assert_eq!(previous.map(|r| r.len()), Some(1));
        // An empty list is still an entry
        assert!(cache.contains(&key));
        assert_eq!(cache.get(&key).map(|r| r.len()), Some(0));
    }

    #[test]
    fn test_clear_single_entry() {
        let mut cache = ResultCache::new();
        cache.put(DeviceKey::new("a"), Arc::new(vec![1]));
        cache.put(DeviceKey::new("b"), Arc::new(vec![2]));

        assert!(cache.clear(&DeviceKey::new("a")));
        assert!(!cache.clear(&DeviceKey::new("a")));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&DeviceKey::new("b")));
    }

    #[test]
    fn test_clear_all() {
        let mut cache = ResultCache::new();
        cache.put(DeviceKey::new("a"), Arc::new(vec![1]));
        cache.put(DeviceKey::single_device(), Arc::new(vec![2]));

        assert_eq!(cache.clear_all(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_single_device_key_is_distinct() {
        let mut cache = ResultCache::new();
        cache.put(DeviceKey::single_device(), Arc::new(vec![1]));

        assert!(cache.contains(&DeviceKey::single_device()));
        assert!(!cache.contains(&DeviceKey::new("_default_")));
    }
}
