//! Application state shared across routes and connections

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::room::RoomRegistry;
use crate::store::{Persistence, RoomRecord};
use crate::user::UserRegistry;
use crate::ws::hub::ConnectionHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<UserRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub hub: Arc<ConnectionHub>,
    pub persistence: Persistence,
}

impl AppState {
    pub fn new(config: Config, persistence: Persistence) -> Self {
        Self {
            config: Arc::new(config),
            users: Arc::new(UserRegistry::new()),
            rooms: Arc::new(RoomRegistry::new()),
            hub: Arc::new(ConnectionHub::new()),
            persistence,
        }
    }

    /// Re-create persisted rooms. They start empty and ownerless.
    pub fn restore_rooms(&self, records: Vec<RoomRecord>) {
        let count = records.len();
        for record in records {
            self.rooms.restore(record);
        }
        if count > 0 {
            info!(rooms = count, "Restored persisted rooms");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Game, Rule};

    #[test]
    fn restored_rooms_are_listed() {
        let state = AppState::new(Config::default(), Persistence::disabled());
        state.restore_rooms(vec![RoomRecord {
            id: "deadbeef".into(),
            name: "saved".into(),
            password: "pw".into(),
            game: Game::new(Rule::Phase),
            revision: 0,
            saved_at: chrono::Utc::now(),
        }]);

        let rooms = state.rooms.list();
        assert_eq!(rooms.len(), 1);
        assert!(rooms[0].has_password);
        assert_eq!(rooms[0].player_count, 0);
        assert_eq!(rooms[0].owner_name, None);
    }
}
