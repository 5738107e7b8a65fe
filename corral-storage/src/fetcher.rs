//! Backing-store abstraction and the in-memory user table.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use corral_core::{FetchError, User, UserId};
use parking_lot::RwLock;

/// Fetcher for retrieving records from the slow, authoritative store.
///
/// This trait abstracts over the actual storage implementation, allowing
/// the coordinator to work with any backing store.
#[async_trait]
pub trait RecordFetcher<K, V>: Send + Sync {
    /// Fetch a record by key. `Ok(None)` means the key does not exist.
    async fn fetch(&self, key: &K) -> Result<Option<V>, FetchError>;
}

/// Mock user table with simulated latency.
pub struct InMemoryUserStore {
    users: RwLock<BTreeMap<UserId, User>>,
    latency: Duration,
    fetch_count: AtomicU64,
}

impl InMemoryUserStore {
    /// Empty table.
    pub fn new(latency: Duration) -> Self {
        Self {
            users: RwLock::new(BTreeMap::new()),
            latency,
            fetch_count: AtomicU64::new(0),
        }
    }

    /// Table seeded with the three demo users.
    pub fn seeded(latency: Duration) -> Self {
        let store = Self::new(latency);
        {
            let mut users = store.users.write();
            for user in [
                User::new(1, "Alice", "alice@gmail.com"),
                User::new(2, "Bob", "bob123@gmail.com"),
                User::new(3, "Charlie", "charlieharlie@gmail.com"),
            ] {
                users.insert(user.id, user);
            }
        }
        store
    }

    /// Store a new user under the next free id (highest existing id + 1).
    pub fn create(&self, name: impl Into<String>, email: impl Into<String>) -> User {
        let mut users = self.users.write();
        let id = users.keys().next_back().map_or(1, |max| max + 1);
        let user = User::new(id, name, email);
        users.insert(id, user.clone());
        user
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times the table has been read through [`RecordFetcher`].
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordFetcher<UserId, User> for InMemoryUserStore {
    async fn fetch(&self, key: &UserId) -> Result<Option<User>, FetchError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.users.read().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_store_serves_demo_users() {
        let store = InMemoryUserStore::seeded(Duration::ZERO);
        let alice = store.fetch(&1).await.unwrap().unwrap();
        assert_eq!(alice.name, "Alice");
        assert!(store.fetch(&42).await.unwrap().is_none());
        assert_eq!(store.fetch_count(), 2);
    }

    #[test]
    fn test_create_allocates_next_id() {
        let store = InMemoryUserStore::seeded(Duration::ZERO);
        let dave = store.create("Dave", "dave@example.com");
        assert_eq!(dave.id, 4);
        assert_eq!(store.len(), 4);

        let empty = InMemoryUserStore::new(Duration::ZERO);
        assert_eq!(empty.create("First", "first@example.com").id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_waits_for_latency() {
        let store = InMemoryUserStore::seeded(Duration::from_millis(200));
        let start = tokio::time::Instant::now();
        store.fetch(&2).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
