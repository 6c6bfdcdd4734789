use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::model::{PhotoId, PhotoRecord};

#[derive(Default)]
struct Favorites {
    order: Vec<PhotoRecord>,
    ids: HashSet<PhotoId>,
}

/// Photos the user has favorited, in the order they were added.
///
/// One instance lives for the whole process and is handed to every screen
/// that reads or writes it, usually as an `Arc<FavoritesStore>`. Nothing is
/// persisted.
#[derive(Default)]
pub struct FavoritesStore {
    inner: RwLock<Favorites>,
}

impl FavoritesStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Favorites> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Favorites> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` if the id was already present; the existing entry
    /// keeps its position.
    pub fn add(&self, photo: PhotoRecord) -> bool {
        let mut favorites = self.write();
        if !favorites.ids.insert(photo.id().clone()) {
            return false;
        }
        debug!(id = %photo.id(), "favorite added");
        favorites.order.push(photo);
        true
    }

    pub fn remove(&self, id: &PhotoId) -> bool {
        let mut favorites = self.write();
        if !favorites.ids.remove(id) {
            return false;
        }
        favorites.order.retain(|photo| photo.id() != id);
        debug!(%id, "favorite removed");
        true
    }

    pub fn contains(&self, id: &PhotoId) -> bool {
        self.read().ids.contains(id)
    }

    /// Snapshot for display.
    pub fn list(&self) -> Vec<PhotoRecord> {
        self.read().order.clone()
    }

    /// Adds the photo when absent, removes it when present. Returns whether
    /// it is a favorite afterwards.
    pub fn toggle(&self, photo: &PhotoRecord) -> bool {
        let mut favorites = self.write();
        if favorites.ids.remove(photo.id()) {
            favorites.order.retain(|p| p.id() != photo.id());
            false
        } else {
            favorites.ids.insert(photo.id().clone());
            favorites.order.push(photo.clone());
            true
        }
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn photo(id: &str) -> PhotoRecord {
        let url = format!("https://images.unsplash.com/{id}");
        PhotoRecord::new(id, url, None, "me", 10, 20).unwrap()
    }

    fn ids(store: &FavoritesStore) -> Vec<String> {
        store.list().iter().map(|p| p.id().to_string()).collect()
    }

    #[test]
    fn add_is_idempotent() {
        let store = FavoritesStore::new();
        assert!(store.add(photo("a")));
        assert!(store.add(photo("b")));
        assert!(!store.add(photo("a")));

        assert_eq!(ids(&store), vec!["a", "b"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn remove_absent_is_noop() {
        let store = FavoritesStore::new();
        store.add(photo("a"));
        let id = PhotoId::new("a");

        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(store.is_empty());
        assert!(!store.contains(&id));
    }

    #[test]
    fn readd_goes_to_the_end() {
        let store = FavoritesStore::new();
        for id in ["a", "b", "c"] {
            store.add(photo(id));
        }
        store.remove(&PhotoId::new("a"));
        store.add(photo("a"));
        assert_eq!(ids(&store), vec!["b", "c", "a"]);
    }

    #[test]
    fn toggle_flips_membership() {
        let store = FavoritesStore::new();
        let p = photo("x");
        assert!(store.toggle(&p));
        assert!(store.contains(p.id()));
        assert!(!store.toggle(&p));
        assert!(!store.contains(p.id()));
    }

    #[test]
    fn shared_between_threads() {
        let store = Arc::new(FavoritesStore::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.add(photo(&((t * 7 + i) % 50).to_string()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let listed = ids(&store);
        let unique: HashSet<_> = listed.iter().collect();
        assert_eq!(unique.len(), listed.len());
    }

    proptest! {
        #[test]
        fn at_most_one_entry_per_id(ops in prop::collection::vec((any::<bool>(), 0u8..8), 0..64)) {
            let store = FavoritesStore::new();
            for (add, n) in ops {
                let id = n.to_string();
                if add {
                    store.add(photo(&id));
                } else {
                    store.remove(&PhotoId::new(id));
                }
            }
            let listed = ids(&store);
            let unique: HashSet<_> = listed.iter().collect();
            prop_assert_eq!(unique.len(), listed.len());
            prop_assert_eq!(store.len(), listed.len());
        }
    }
}
