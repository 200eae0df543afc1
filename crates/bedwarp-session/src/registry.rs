//! The registry of connected players.
//!
//! One map, one read/write lock. Handlers insert on login and remove on
//! disconnect; the lifecycle controller clears it on shutdown. Every
//! operation takes the lock once, so each is atomic with respect to the
//! others.

use std::collections::HashMap;
use std::sync::Arc;

use bedwarp_transport::ConnectionId;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{Player, PlayerId};

/// Concurrent map of active players keyed by [`PlayerId`].
///
/// At most one player per id: inserting a second one replaces the first
/// and hands it back so the caller can evict it.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    players: RwLock<HashMap<PlayerId, Arc<Player>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `player`, returning whoever held its id before.
    pub fn insert(&self, player: Arc<Player>) -> Option<Arc<Player>> {
        let id = player.id().clone();
        let previous = self.players.write().insert(id.clone(), player);
        if let Some(previous) = &previous {
            info!(player_id = %id, old_conn = %previous.session().conn_id(), "player replaced");
        }
        previous
    }

    pub fn remove(&self, id: &PlayerId) -> Option<Arc<Player>> {
        self.players.write().remove(id)
    }

    /// Removes `id` only if it is still served by `conn_id`.
    ///
    /// A connection whose player was replaced gets `None` here and leaves
    /// the newer entry alone. Calling it again after a successful removal
    /// is also a no-op.
    pub fn remove_session(&self, id: &PlayerId, conn_id: ConnectionId) -> Option<Arc<Player>> {
        let mut players = self.players.write();
        match players.get(id) {
            Some(player) if player.is_on(conn_id) => players.remove(id),
            Some(_) => {
                debug!(player_id = %id, %conn_id, "entry belongs to a newer connection");
                None
            }
            None => None,
        }
    }

    pub fn get(&self, id: &PlayerId) -> Option<Arc<Player>> {
        self.players.read().get(id).cloned()
    }

    /// Point-in-time copy of every registered player. The lock is held
    /// only while copying.
    pub fn snapshot(&self) -> Vec<Arc<Player>> {
        self.players.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }

    /// Removes everyone, returning the players that were registered.
    pub fn clear(&self) -> Vec<Arc<Player>> {
        self.players.write().drain().map(|(_, player)| player).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestIdentity;
    use crate::{ChainAuthenticator, SessionHandle};

    fn player(xuid: &str, conn: u64) -> Arc<Player> {
        let (chain, skin) = TestIdentity::new("Steve", xuid).login_tokens();
        let identity = ChainAuthenticator.verify(&chain, &skin).unwrap();
        let handle = SessionHandle::new(ConnectionId::new(conn), "127.0.0.1:1".parse().unwrap());
        Arc::new(Player::new(identity, handle))
    }

    // =====================================================================
    // insert / get
    // =====================================================================

    #[test]
    fn test_insert_new_player_returns_none() {
        let registry = SessionRegistry::new();
        assert!(registry.insert(player("1", 1)).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&PlayerId::new("1")).is_some());
    }

    #[test]
    fn test_insert_duplicate_returns_previous() {
        let registry = SessionRegistry::new();
        registry.insert(player("1", 1));

        let previous = registry.insert(player("1", 2)).unwrap();

        assert!(previous.is_on(ConnectionId::new(1)));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&PlayerId::new("1")).unwrap().is_on(ConnectionId::new(2)));
    }

    #[test]
    fn test_get_unknown_returns_none() {
        assert!(SessionRegistry::new().get(&PlayerId::new("nobody")).is_none());
    }

    // =====================================================================
    // remove / remove_session
    // =====================================================================

    #[test]
    fn test_remove_session_owned_entry() {
        let registry = SessionRegistry::new();
        registry.insert(player("1", 1));

        assert!(registry.remove_session(&PlayerId::new("1"), ConnectionId::new(1)).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_session_twice_is_noop() {
        let registry = SessionRegistry::new();
        registry.insert(player("1", 1));
        registry.insert(player("2", 2));

        registry.remove_session(&PlayerId::new("1"), ConnectionId::new(1));
        assert!(registry.remove_session(&PlayerId::new("1"), ConnectionId::new(1)).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_session_leaves_newer_connection() {
        let registry = SessionRegistry::new();
        registry.insert(player("1", 1));
        registry.insert(player("1", 2));

        assert!(registry.remove_session(&PlayerId::new("1"), ConnectionId::new(1)).is_none());
        assert!(registry.get(&PlayerId::new("1")).unwrap().is_on(ConnectionId::new(2)));
    }

    #[test]
    fn test_remove_ignores_owner() {
        let registry = SessionRegistry::new();
        registry.insert(player("1", 1));
        assert!(registry.remove(&PlayerId::new("1")).is_some());
        assert!(registry.remove(&PlayerId::new("1")).is_none());
    }

    // =====================================================================
    // snapshot / clear
    // =====================================================================

    #[test]
    fn test_snapshot_is_a_copy() {
        let registry = SessionRegistry::new();
        registry.insert(player("1", 1));
        registry.insert(player("2", 2));

        let snapshot = registry.snapshot();
        registry.clear();

        assert_eq!(snapshot.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear_returns_removed_players() {
        let registry = SessionRegistry::new();
        registry.insert(player("1", 1));
        registry.insert(player("2", 2));

        let mut ids: Vec<String> =
            registry.clear().iter().map(|p| p.id().to_string()).collect();
        ids.sort();

        assert_eq!(ids, ["1", "2"]);
    }

    // =====================================================================
    // Concurrency
    // =====================================================================

    #[test]
    fn test_concurrent_duplicate_inserts_leave_one_entry() {
        let registry = Arc::new(SessionRegistry::new());
        let players: Vec<_> = (1..=8).map(|conn| player("dup", conn)).collect();

        let threads: Vec<_> = players
            .into_iter()
            .map(|p| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.insert(p))
            })
            .collect();
        let replaced = threads
            .into_iter()
            .filter_map(|t| t.join().unwrap())
            .count();

        assert_eq!(registry.len(), 1);
        // Every insert but the first displaced someone.
        assert_eq!(replaced, 7);
    }

    #[test]
    fn test_concurrent_insert_and_remove_distinct_ids() {
        let registry = Arc::new(SessionRegistry::new());
        let threads: Vec<_> = (0..16u64)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let p = player(&i.to_string(), i);
                std::thread::spawn(move || {
                    registry.insert(p);
                    if i % 2 == 0 {
                        registry.remove_session(&PlayerId::new(i.to_string()), ConnectionId::new(i));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(registry.len(), 8);
        assert!(registry.snapshot().iter().all(|p| p.id().as_str().parse::<u64>().unwrap() % 2 == 1));
    }
}
