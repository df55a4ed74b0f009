//! Connected identities and their transient room assignment

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::room::RoomId;

/// 32 lowercase hex characters, minted per connection
pub type UserId = String;

/// Name given to every fresh connection
pub const DEFAULT_USER_NAME: &str = "Player";

/// Role of a user inside a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Watches only
    #[default]
    Spectator,
    /// Marks for one color
    Player,
    /// Adjudicates: marks any color and corrects mistakes
    Referee,
}

/// A connected user. Role and color belong to the room membership, not
/// here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub room_id: Option<RoomId>,
}

impl User {
    fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            name,
            room_id: None,
        }
    }

    pub fn in_room(&self) -> bool {
        self.room_id.is_some()
    }
}

/// Registry of every connected user
pub struct UserRegistry {
    users: DashMap<UserId, User>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }

    /// Mint a new identity and register it
    pub fn register(&self) -> User {
        let user = User::new(DEFAULT_USER_NAME.to_string());
        self.users.insert(user.id.clone(), user.clone());
        user
    }

    pub fn get(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|u| u.clone())
    }

    pub fn remove(&self, user_id: &str) -> Option<User> {
        self.users.remove(user_id).map(|(_, u)| u)
    }

    pub fn rename(&self, user_id: &str, name: String) -> bool {
        self.update(user_id, |user| user.name = name)
    }

    /// Record that a user entered a room
    pub fn set_room(&self, user_id: &str, room_id: RoomId) -> bool {
        self.update(user_id, |user| user.room_id = Some(room_id))
    }

    /// Back to the lobby
    pub fn clear_room(&self, user_id: &str) -> bool {
        self.update(user_id, |user| user.room_id = None)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn update(&self, user_id: &str, f: impl FnOnce(&mut User)) -> bool {
        match self.users.get_mut(user_id) {
            Some(mut user) => {
                f(&mut user);
                true
            }
            None => false,
        }
    }
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
