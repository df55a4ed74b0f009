//! Read-only views of a room for broadcast and listing

use serde::Serialize;

use crate::game::{Color, Game, GameStatus, Rule};
use crate::user::{Role, UserId};

use super::RoomId;

/// Room metadata as shown to members
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomView {
    pub id: RoomId,
    pub name: String,
    /// `None` only while the room is empty
    pub owner_id: Option<UserId>,
    pub has_password: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub player_color: Color,
}

/// Complete room state taken under one lock. Built once per broadcast and
/// shared by every recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSnapshot {
    pub room: RoomView,
    pub game: Game,
    /// In join order
    pub users: Vec<UserView>,
}

impl RoomSnapshot {
    /// The same snapshot addressed to one member
    pub fn view_for<'a>(&'a self, user_id: &'a str) -> StateView<'a> {
        StateView {
            snapshot: self,
            current_user: user_id,
        }
    }
}

/// Per-recipient wrapper: the snapshot fields plus `current_user`
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StateView<'a> {
    #[serde(flatten)]
    pub snapshot: &'a RoomSnapshot,
    pub current_user: &'a str,
}

/// Public lobby entry for `list_rooms`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub has_password: bool,
    pub player_count: usize,
    pub owner_name: Option<String>,
    pub rule: Rule,
    pub status: GameStatus,
}
