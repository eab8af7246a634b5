//! Shared media cache
//!
//! Maps cache keys to the live shared media built for them. The table lock is
//! held only for the duration of a single lookup, insert or removal, never
//! while a media is being built.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::instance::Media;

/// Key → shared media table
#[derive(Default)]
pub struct MediaCache {
    entries: Mutex<HashMap<String, Arc<Media>>>,
}

impl MediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live media and acquire a user on it
    ///
    /// Returns `None` when there is no entry or the entry was torn down.
    pub fn lookup(&self, key: &str) -> Option<Arc<Media>> {
        let entries = self.entries.lock();
        let media = entries.get(key)?;
        if media.try_acquire() {
            Some(Arc::clone(media))
        } else {
            None
        }
    }

    /// Insert `media` under `key` unless a live media is already cached there
    ///
    /// `media` must already carry the caller's user. Returns the media that is
    /// cached once the call returns; if it is not `media`, a user was acquired
    /// on it for the caller.
    pub fn insert_or_get(&self, key: &str, media: &Arc<Media>) -> Arc<Media> {
        let mut entries = self.entries.lock();

        match entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().try_acquire() {
                    return Arc::clone(occupied.get());
                }
                occupied.insert(Arc::clone(media));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(media));
            }
        }

        Arc::clone(media)
    }

    /// Remove the entry for `key` if it still holds media `media_id`
    pub fn remove_if(&self, key: &str, media_id: u64) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(media) if media.id() == media_id => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// The media cached under `key`, without acquiring a user
    pub fn get(&self, key: &str) -> Option<Arc<Media>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_media() -> Arc<Media> {
        let media = Media::new();
        assert!(media.try_acquire());
        media
    }

    #[test]
    fn test_lookup_acquires() {
        let cache = MediaCache::new();
        let media = owned_media();

        let cached = cache.insert_or_get("k", &media);
        assert!(Arc::ptr_eq(&cached, &media));

        let found = cache.lookup("k").unwrap();
        assert!(Arc::ptr_eq(&found, &media));
        assert_eq!(media.users(), 2);
        assert!(cache.lookup("other").is_none());
    }

    #[test]
    fn test_insert_keeps_live_winner() {
        let cache = MediaCache::new();
        let first = owned_media();
        let second = owned_media();

        cache.insert_or_get("k", &first);
        let winner = cache.insert_or_get("k", &second);

        assert!(Arc::ptr_eq(&winner, &first));
        assert_eq!(first.users(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_torn_down_entry_is_replaced() {
        let cache = MediaCache::new();
        let first = owned_media();
        cache.insert_or_get("k", &first);
        first.release();

        assert!(cache.lookup("k").is_none());

        let second = owned_media();
        let winner = cache.insert_or_get("k", &second);
        assert!(Arc::ptr_eq(&winner, &second));
    }

    #[test]
    fn test_remove_if_checks_identity() {
        let cache = MediaCache::new();
        let first = owned_media();
        cache.insert_or_get("k", &first);

        assert!(!cache.remove_if("k", first.id() + 1000));
        assert!(cache.contains("k"));
        assert!(cache.remove_if("k", first.id()));
        assert!(cache.is_empty());
    }
}
