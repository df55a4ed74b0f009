//! Rooms: one game plus its members, with authorization and lifecycle

pub mod auth;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod room;
pub mod snapshot;
pub mod sweeper;

pub use registry::RoomRegistry;
pub use room::{Departure, Room};
pub use snapshot::{RoomInfo, RoomSnapshot, RoomView, StateView, UserView};

use crate::error::ErrorKind;
use crate::game::GameError;

/// 8 lowercase hex characters
pub type RoomId = String;

/// Errors raised by room operations. A rejected operation leaves the room
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("only the room owner can do this")]
    NotOwner,

    #[error("only a referee can do this")]
    NotReferee,

    #[error("spectators cannot change the board")]
    SpectatorForbidden,

    #[error("players may only act for their own color")]
    WrongColor,

    #[error("another player already holds this color")]
    PlayerAlreadySet,

    #[error("a player needs a color")]
    PlayerNeedsColor,

    #[error("user not found in room")]
    UserNotFound,

    #[error("wrong password")]
    WrongPassword,

    #[error("room no longer exists")]
    RoomClosed,

    #[error("cannot change the rule while a game is in progress")]
    GameInProgress,

    #[error("cell texts can only change before the game starts")]
    TextsLocked,

    #[error(transparent)]
    Game(#[from] GameError),
}

impl RoomError {
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::NotOwner => "not_owner",
            RoomError::NotReferee => "not_referee",
            RoomError::SpectatorForbidden => "spectator_forbidden",
            RoomError::WrongColor => "wrong_color",
            RoomError::PlayerAlreadySet => "player_already_set",
            RoomError::PlayerNeedsColor => "player_needs_color",
            RoomError::UserNotFound => "user_not_found",
            RoomError::WrongPassword => "wrong_password",
            RoomError::RoomClosed => "room_not_found",
            RoomError::GameInProgress => "game_in_progress",
            RoomError::TextsLocked => "texts_locked",
            RoomError::Game(e) => e.code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::NotOwner
            | RoomError::NotReferee
            | RoomError::SpectatorForbidden
            | RoomError::WrongColor => ErrorKind::Authorization,
            RoomError::PlayerNeedsColor => ErrorKind::Validation,
            RoomError::UserNotFound | RoomError::RoomClosed => ErrorKind::NotFound,
            RoomError::PlayerAlreadySet
            | RoomError::WrongPassword
            | RoomError::GameInProgress
            | RoomError::TextsLocked => ErrorKind::State,
            RoomError::Game(e) => e.kind(),
        }
    }
}
